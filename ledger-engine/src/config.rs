//! Configuration for the ledger engine
//!
//! The surrounding application passes a `Config` into the event API at
//! construction time; there is no ambient global state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Currency symbol used in user-facing result messages
    pub currency_symbol: String,

    /// Tolerance below which an outstanding amount counts as settled
    /// (absorbs rounding on partial payments and returns)
    pub settlement_tolerance: Decimal,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/ledger"),
            currency_symbol: "$".to_string(),
            settlement_tolerance: Decimal::new(1, 2), // 0.01
            rocksdb: RocksDbConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(symbol) = std::env::var("LEDGER_CURRENCY_SYMBOL") {
            config.currency_symbol = symbol;
        }

        if let Ok(tolerance) = std::env::var("LEDGER_SETTLEMENT_TOLERANCE") {
            config.settlement_tolerance = tolerance.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid LEDGER_SETTLEMENT_TOLERANCE: {}", e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the rules cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.settlement_tolerance < Decimal::ZERO {
            return Err(crate::Error::Config(
                "settlement_tolerance must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.currency_symbol, "$");
        assert_eq!(config.settlement_tolerance, Decimal::new(1, 2));
        assert_eq!(config.rocksdb.max_background_jobs, 4);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "/var/lib/ledger"
currency_symbol = "BDT "
settlement_tolerance = "0.05"

[rocksdb]
write_buffer_size_mb = 128
max_write_buffer_number = 2
max_background_jobs = 2
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/ledger"));
        assert_eq!(config.currency_symbol, "BDT ");
        assert_eq!(config.settlement_tolerance, Decimal::new(5, 2));
        assert_eq!(config.rocksdb.write_buffer_size_mb, 128);
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let config = Config {
            settlement_tolerance: Decimal::new(-1, 2),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
