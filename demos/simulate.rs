use fedsig_coordinator::protocol::ClientRegisterPayload;
use fedsig_coordinator::{CoordinatorConfig, CoordinatorState, Ioc, IocType, ThreatLevel};
use std::collections::HashMap;

/// Spins up an in-process coordinator, registers a handful of simulated
/// sensors, and feeds them the same IOCs to watch consensus promotion
/// happen live.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("fedsig coordinator simulator");
    println!("=============================");

    let mut data_dir = std::env::temp_dir();
    data_dir.push(format!("fedsig-simulate-{}", std::process::id()));
    let config = CoordinatorConfig { data_dir: data_dir.clone(), ..CoordinatorConfig::default() };

    let state = CoordinatorState::new(config)?;

    let clients = ["sensor-east", "sensor-west", "sensor-lab"];
    for client_id in clients {
        let (_rx, _reply) = state.register(ClientRegisterPayload {
            client_id: client_id.to_string(),
            hostname: format!("{client_id}.local"),
            watch_list: vec!["/var/tmp".to_string()],
        })?;
        println!("✓ registered {client_id}");
    }

    let samples = [
        (IocType::FileHash, "d41d8cd98f00b204e9800998ecf8427e", ThreatLevel::High),
        (IocType::IpAddress, "203.0.113.42", ThreatLevel::Critical),
        (IocType::Domain, "malicious.example", ThreatLevel::Medium),
    ];

    for (ioc_type, value, threat_level) in samples {
        println!("\nreporting {value}:");
        for client_id in clients {
            let ioc = Ioc::new(ioc_type, value.to_string(), threat_level, client_id.to_string(), HashMap::new());
            match state.report_ioc(ioc)? {
                Some(intel) => println!(
                    "  {client_id} -> VERIFIED (trust_weight={:.2}, voters={:?})",
                    intel.trust_weight, intel.verified_by
                ),
                None => println!("  {client_id} -> pending"),
            }
        }
    }

    let stats = state.system_stats();
    println!("\nfinal system stats:");
    println!(
        "  total_iocs={} verified_iocs={} pending_iocs={}",
        stats.total_iocs, stats.verified_iocs, stats.pending_iocs
    );
    println!("  average_trust={:.3}", stats.average_trust);

    std::fs::remove_dir_all(&data_dir).ok();
    Ok(())
}
