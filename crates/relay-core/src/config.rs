//! Worker configuration.
//!
//! 既定値は実運用の値に合わせています:
//! - 1 回の claim は 5 件まで
//! - claim 往復の締め切りは 15 秒
//! - 送信間隔は 1.5 秒（キャリアのレート制限対策）
//! - 配送確認 1 件につき 16 paise（₹0.16）

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Credits;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Maximum jobs taken by one claim round.
    pub claim_batch_size: usize,

    /// Deadline for the whole read-then-claim round.
    pub claim_timeout_ms: u64,

    /// Minimum gap between two sends.
    pub send_interval_ms: u64,

    /// Credit per confirmed delivery, in paise.
    pub credit_per_delivery: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            claim_batch_size: 5,
            claim_timeout_ms: 15_000,
            send_interval_ms: 1_500,
            credit_per_delivery: 16,
        }
    }
}

impl RelayConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.claim_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "claim_batch_size must be at least 1".to_string(),
            ));
        }
        if self.claim_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "claim_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn claim_timeout(&self) -> Duration {
        Duration::from_millis(self.claim_timeout_ms)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn credit(&self) -> Credits {
        Credits::from_paise(self.credit_per_delivery)
    }
}
