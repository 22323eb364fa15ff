use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the Argus daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store configuration
    pub store: StoreConfig,
    /// Correlation engine configuration
    pub correlation: CorrelationConfig,
    /// Narrative generator configuration
    pub narrative: NarrativeConfig,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
}

/// Correlation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Seconds between correlation ticks
    pub interval_seconds: u64,
    /// Brute-force lookback window in minutes
    pub brute_force_window_minutes: i64,
    /// Failed attempts per IP before the brute-force rule fires
    pub brute_force_threshold: u64,
    /// High-risk-event lookback window in minutes
    pub high_risk_window_minutes: i64,
    /// Risk score above which an event is incident-worthy on its own
    pub high_risk_min_score: f64,
    /// Maximum high-risk events examined per tick
    pub high_risk_limit: usize,
    /// Kill-chain trigger lookback window in minutes
    pub kill_chain_window_minutes: i64,
}

/// Narrative generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// When false, incidents carry a fixed placeholder narrative
    pub enabled: bool,
    /// Chat endpoint URL
    pub url: String,
    /// Model name
    pub model: String,
    /// Per-call timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store: StoreConfig {
                db_path: PathBuf::from("argus.db"),
            },
            correlation: CorrelationConfig {
                interval_seconds: 60,
                brute_force_window_minutes: 60,
                brute_force_threshold: 5,
                high_risk_window_minutes: 5,
                high_risk_min_score: 90.0,
                high_risk_limit: 10,
                kill_chain_window_minutes: 60,
            },
            narrative: NarrativeConfig {
                enabled: true,
                url: "http://localhost:11434/api/chat".to_string(),
                model: "llama2".to_string(),
                timeout_seconds: 60,
            },
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::default();
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.correlation.interval_seconds, 60);
        assert_eq!(loaded.correlation.brute_force_threshold, 5);
        assert_eq!(loaded.narrative.timeout_seconds, 60);
        assert_eq!(loaded.store.db_path, PathBuf::from("argus.db"));
    }
}
