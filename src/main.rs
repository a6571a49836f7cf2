/* src/main.rs */

use dotenvy::dotenv;
use fancy_log::{LogLevel, log, set_log_level};
use lazy_motd::lazy_motd;
use std::env;
use std::sync::Arc;
use zonekeeper::config::{AppConfig, NameServerMode};
use zonekeeper::{
    DnsUpdateClient, HealthMonitor, MemoryNameServer, MirrorHandle, NameServer, RecordStore,
    Records,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // --- Initialization ---
    dotenv().ok();
    let level = env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase();
    let log_level = match level.as_str() {
        "debug" => LogLevel::Debug,
        "warn" => LogLevel::Warn,
        "error" => LogLevel::Error,
        _ => LogLevel::Info,
    };
    set_log_level(log_level);
    lazy_motd!();

    // --- Load Config ---
    let config = match AppConfig::load_or_create_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            log(LogLevel::Error, &format!("Failed to load config: {}", e));
            return Err(e.into());
        }
    };
    let zone = Arc::new(config.build_zone()?);
    let seed = config.seed_records(&zone)?;

    // --- Name Server ---
    let timeout = config.nameserver.timeout();
    let nameserver: Arc<dyn NameServer> = match config.nameserver.mode {
        NameServerMode::Dns => {
            log(
                LogLevel::Info,
                &format!(
                    "Mirroring {} to {}",
                    zone.origin(),
                    config.nameserver.address
                ),
            );
            Arc::new(DnsUpdateClient::new(
                config.nameserver.address,
                zone.origin(),
                timeout,
                seed,
            ))
        }
        NameServerMode::Memory => {
            log(
                LogLevel::Warn,
                "Using the in-memory name server; changes are not published.",
            );
            Arc::new(MemoryNameServer::with_records(seed))
        }
    };

    // --- Initialize Services ---
    let store = RecordStore::new(MirrorHandle::spawn(nameserver.clone(), timeout));
    store.load(nameserver.fetch_records().await?);
    let records = Records::new(store.clone(), zone.clone());

    let health = HealthMonitor::new(nameserver, timeout);
    let probe_task = health.start(config.health.interval());

    log(
        LogLevel::Info,
        &format!(
            "zonekeeper managing {} with {} records",
            zone.domain(),
            records.get_all().len()
        ),
    );

    // --- Status Feed ---
    let mut feed = health.feed(config.health.feed_interval());
    loop {
        tokio::select! {
            status = feed.recv() => {
                let Some(status) = status else { break };
                log(LogLevel::Info, &format!("Status {}", status));
                // Violations are logged by the check itself.
                let _ = store.check_invariants();
                if store.mirror_failures() > 0 {
                    log(
                        LogLevel::Warn,
                        &format!(
                            "{} mirror failures so far, last: {:?}",
                            store.mirror_failures(),
                            store.last_mirror_error()
                        ),
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log(LogLevel::Info, "Shutdown requested");
                break;
            }
        }
    }

    feed.close().await;
    probe_task.abort();
    log(LogLevel::Info, "zonekeeper stopped");
    Ok(())
}
