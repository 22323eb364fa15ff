use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use argus::config::Config;
use argus::narrative::{NarrativeGenerator, OllamaNarrativeClient, StaticNarrative};
use argus::store::SqliteStore;
use argus::CorrelationEngine;

/// Main daemon entry point: runs the correlation engine on a fixed
/// interval until a termination signal arrives.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting Argus daemon...");

    // Load configuration
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file not found, using defaults");
        Config::default()
    };

    // Setup graceful shutdown signal handling
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    // Open the store; the same backend serves events, profiles and
    // incidents.
    let store = Arc::new(SqliteStore::new(&config.store.db_path)?);
    log::info!("Store opened at {:?}", config.store.db_path);

    let narrative: Arc<dyn NarrativeGenerator> = if config.narrative.enabled {
        Arc::new(OllamaNarrativeClient::from_config(&config.narrative))
    } else {
        log::warn!("Narrative generation disabled");
        Arc::new(StaticNarrative::disabled())
    };

    let engine = CorrelationEngine::new(
        store.clone(),
        store.clone(),
        narrative,
        config.correlation.clone(),
    );

    log::info!(
        "Correlation engine initialized (interval: {}s). Press Ctrl+C to stop.",
        config.correlation.interval_seconds
    );

    // Periodic correlation loop. The in-flight tick always completes;
    // shutdown is only observed between ticks.
    while running.load(Ordering::SeqCst) {
        let created = engine.run_correlation_rules().await;
        if created > 0 {
            log::info!("Correlation tick created {} incident(s)", created);
        } else {
            log::debug!("Correlation tick created no incidents");
        }

        // Sleep in short slices so shutdown stays prompt
        let mut remaining = config.correlation.interval_seconds;
        while remaining > 0 && running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(1)).await;
            remaining -= 1;
        }
    }

    log::info!("Argus daemon stopped");
    Ok(())
}
