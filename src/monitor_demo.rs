use integration_monitor::{
    init_logging, HealthStatus, IntegrationDefinition, Monitor, MonitorConfig, MonitoringStatus,
    ProviderRegistry, SimulatedProvider, StaticCatalog,
};
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;

/// Print a one-screen summary of the fleet
fn print_status(status: &MonitoringStatus) {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║ INTEGRATION MONITOR                                        ║");
    println!("╠════════════════════════════════════════════════════════════╣");
    println!("║ Integrations: {:44} ║", status.total_integrations);
    println!(
        "║ Healthy/Degraded/Unhealthy: {:30} ║",
        format!("{}/{}/{}", status.healthy, status.degraded, status.unhealthy)
    );
    println!(
        "║ Alerts (active/total): {:35} ║",
        format!("{}/{}", status.active_alerts, status.total_alerts)
    );
    println!(
        "║ Cycles (checks/metrics/alerts): {:26} ║",
        format!(
            "{}/{}/{}",
            status.health_check_cycles, status.metrics_cycles, status.alert_evaluations
        )
    );
    println!("╚════════════════════════════════════════════════════════════╝\n");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info", None)?;

    // First argument: optional JSON config file
    let config = match std::env::args().nth(1) {
        Some(path) => MonitorConfig::from_file(path)?,
        None => MonitorConfig {
            health_check_interval: Duration::from_secs(2),
            metrics_interval: Duration::from_secs(2),
            alert_evaluation_interval: Duration::from_secs(3),
            check_timeout: Duration::from_millis(500),
            retry_attempts: 1,
            retry_delay: Duration::from_millis(100),
            max_failures: 3,
            deduplicate_alerts: true,
            ..MonitorConfig::default()
        },
    };

    let catalog = StaticCatalog::new(vec![
        IntegrationDefinition::new("trendyol", "Trendyol", "marketplace"),
        IntegrationDefinition::new("hepsiburada", "Hepsiburada", "marketplace"),
        IntegrationDefinition::new("aras", "Aras Kargo", "cargo"),
        IntegrationDefinition::new("yurtici", "Yurtici Kargo", "cargo"),
        IntegrationDefinition::new("logo", "Logo ERP", "erp"),
    ]);

    let registry = ProviderRegistry::new();
    registry.register(
        "trendyol",
        Arc::new(SimulatedProvider::new("trendyol").with_latency(Duration::from_millis(40))),
    );
    registry.register(
        "hepsiburada",
        Arc::new(SimulatedProvider::new("hepsiburada").with_fail_every(4)),
    );
    registry.register(
        "aras",
        Arc::new(SimulatedProvider::new("aras").with_latency(Duration::from_millis(900))),
    );
    let yurtici = Arc::new(SimulatedProvider::new("yurtici"));
    registry.register("yurtici", yurtici.clone());
    // "logo" has no provider and is skipped at start

    let monitor = Arc::new(Monitor::new(config, Arc::new(catalog), registry));
    monitor
        .register_alert_callback(|alert| {
            println!("🚨 [{:?}] {}", alert.severity, alert.title);
        })
        .await;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    monitor.start(cancel_rx).await?;
    info!("Monitor running, press Ctrl+C to stop");

    let reporter = {
        let monitor = monitor.clone();
        tokio::spawn(async move {
            let mut round = 0u32;
            loop {
                tokio::time::sleep(Duration::from_secs(5)).await;
                round += 1;
                // Take yurtici down for a while to show failure and recovery
                match round {
                    2 => yurtici.set_healthy(false),
                    6 => yurtici.set_healthy(true),
                    _ => {}
                }

                let status = monitor.get_monitoring_status().await;
                print_status(&status);
                for (id, health) in monitor.get_all_health_status().await {
                    if health.status != HealthStatus::Healthy {
                        warn!(
                            "{} is {} ({} consecutive failures)",
                            id, health.status, health.failure_count
                        );
                    }
                }
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    let _ = cancel_tx.send(true);
    reporter.abort();
    monitor.stop().await?;

    let aggregated = monitor.get_aggregated_metrics().await;
    info!(
        "Final availability {:.2}%, error rate {:.2}%",
        aggregated.overall_availability, aggregated.overall_error_rate
    );
    Ok(())
}
