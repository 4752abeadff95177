//! Ledger and identity configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// sled database directory
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Directory of `<party>.pem` certificates
    #[serde(default = "default_certificates_dir")]
    pub certificates_dir: PathBuf,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            certificates_dir: default_certificates_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("appraisal.db")
}
fn default_certificates_dir() -> PathBuf {
    PathBuf::from("certificates")
}
fn default_log_filter() -> String {
    "appraisal_ledger=info".to_string()
}

impl Config {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_take_defaults() {
        let config: Config = toml::from_str(
            r#"
            [ledger]
            path = "/var/lib/appraisal"
            "#,
        )
        .unwrap();
        assert_eq!(config.ledger.path, PathBuf::from("/var/lib/appraisal"));
        assert_eq!(config.identity.certificates_dir, PathBuf::from("certificates"));
        assert_eq!(config.logging.filter, "appraisal_ledger=info");
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.ledger.path, PathBuf::from("appraisal.db"));
    }
}
