use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;

use argus::config::Config;
use argus::narrative::{NarrativeGenerator, OllamaNarrativeClient, StaticNarrative};
use argus::store::SqliteStore;
use argus::{CorrelationEngine, IngestStatus, IngestionService};

/// Argus SIEM core command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "argus", about = "Argus SIEM core CLI")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Ingest raw log payloads from a JSON-lines file
    Ingest {
        /// Path to a file with one JSON payload per line
        #[structopt(short, long)]
        file: PathBuf,
        /// Source type (auth, transaction, firewall, edr, os, syslog)
        #[structopt(short, long)]
        source: String,
        /// Path to configuration file
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Run a single correlation tick
    Correlate {
        /// Path to configuration file
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// List recent incidents
    Incidents {
        /// Maximum number of incidents to show
        #[structopt(short, long, default_value = "10")]
        limit: usize,
        /// Path to configuration file
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn load_config(path: &PathBuf) -> Config {
    if path.exists() {
        match Config::from_file(path) {
            Ok(config) => return config,
            Err(e) => eprintln!("Failed to load config {:?}: {}, using defaults", path, e),
        }
    }
    Config::default()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Ingest {
            file,
            source,
            config,
        } => {
            if !file.exists() {
                eprintln!("File not found: {:?}", file);
                std::process::exit(1);
            }

            let config = load_config(&config);
            let store = Arc::new(SqliteStore::new(&config.store.db_path)?);
            let service = IngestionService::new(store.clone(), store);

            let reader = BufReader::new(File::open(&file)?);
            let mut indexed = 0usize;
            let mut failed = 0usize;

            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<serde_json::Value>(&line) {
                    Ok(raw) => match service.ingest_log(&raw, &source) {
                        IngestStatus::Indexed => indexed += 1,
                        IngestStatus::Failed => failed += 1,
                    },
                    Err(e) => {
                        eprintln!("Skipping unparseable line: {}", e);
                        failed += 1;
                    }
                }
            }

            println!("Ingested {} event(s), {} failed", indexed, failed);
        }
        Cli::Correlate { config } => {
            let config = load_config(&config);
            let store = Arc::new(SqliteStore::new(&config.store.db_path)?);

            let narrative: Arc<dyn NarrativeGenerator> = if config.narrative.enabled {
                Arc::new(OllamaNarrativeClient::from_config(&config.narrative))
            } else {
                Arc::new(StaticNarrative::disabled())
            };

            let engine = CorrelationEngine::new(
                store.clone(),
                store,
                narrative,
                config.correlation.clone(),
            );

            let created = engine.run_correlation_rules().await;
            println!("Correlation run created {} incident(s)", created);
        }
        Cli::Incidents { limit, config } => {
            use argus::store::IncidentStore;

            let config = load_config(&config);
            let store = SqliteStore::new(&config.store.db_path)?;

            let incidents = store.recent_incidents(limit)?;
            if incidents.is_empty() {
                println!("No incidents recorded");
            }
            for incident in incidents {
                println!(
                    "[{}] {} - {} (severity: {}, status: {}, risk: {})",
                    incident.created_at.format("%Y-%m-%d %H:%M:%S"),
                    incident.rule_name,
                    incident.title,
                    incident.severity.as_str(),
                    incident.status.as_str(),
                    incident.risk_score
                );
            }
        }
    }

    Ok(())
}
