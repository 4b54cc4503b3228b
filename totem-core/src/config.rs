//! Runtime configuration.
//!
//! All thresholds are passed in at construction. Defaults match the
//! production policy: 5 PIN attempts before a 30 second lock, 100 000
//! derivation rounds, self-destruct after 10 failures, and backup payloads
//! chunked above 2000 characters.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use totem_protocol::backup::{ChunkLayout, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_THRESHOLD};
use totem_protocol::crypto::DEFAULT_PIN_KDF_ROUNDS;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Longest accepted PIN lockout (one day)
pub const MAX_LOCKOUT_SECS: u64 = 86_400;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TotemConfig {
    pub credential: CredentialConfig,
    pub self_destruct: SelfDestructConfig,
    pub backup: BackupConfig,
}

/// PIN policy
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Consecutive mismatches before the lock engages
    pub max_attempts: u32,
    pub lockout_secs: u64,
    /// PBKDF2 iteration count
    pub kdf_rounds: u32,
    pub min_pin_len: usize,
    pub max_pin_len: usize,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_secs: 30,
            kdf_rounds: DEFAULT_PIN_KDF_ROUNDS,
            min_pin_len: 4,
            max_pin_len: 6,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfDestructConfig {
    pub enabled: bool,
    /// Failures that trigger the wipe
    pub threshold: u32,
}

impl Default for SelfDestructConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub chunk_threshold: usize,
    pub chunk_size: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl BackupConfig {
    pub fn layout(&self) -> ChunkLayout {
        ChunkLayout {
            threshold: self.chunk_threshold,
            chunk_size: self.chunk_size,
        }
    }
}

impl TotemConfig {
    /// Parse a (possibly partial) JSON document and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TotemConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.credential;
        if c.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if c.lockout_secs > MAX_LOCKOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "lockout_secs {} exceeds {}",
                c.lockout_secs, MAX_LOCKOUT_SECS
            )));
        }
        if c.kdf_rounds == 0 {
            return Err(ConfigError::Invalid("kdf_rounds must be at least 1".into()));
        }
        if c.min_pin_len == 0 || c.min_pin_len > c.max_pin_len {
            return Err(ConfigError::Invalid(format!(
                "PIN length range {}..={} is empty",
                c.min_pin_len, c.max_pin_len
            )));
        }
        if self.self_destruct.enabled && self.self_destruct.threshold == 0 {
            return Err(ConfigError::Invalid("self-destruct threshold must be at least 1".into()));
        }
        if self.backup.layout().validate().is_err() {
            return Err(ConfigError::Invalid(format!(
                "chunk size {} must be between 1 and the threshold {}",
                self.backup.chunk_size, self.backup.chunk_threshold
            )));
        }
        Ok(())
    }
}
