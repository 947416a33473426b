//! Daemon configuration.
//!
//! Loads and validates xponmgrd configuration from a TOML file; the
//! binary applies command line overrides on top. Every knob has a
//! built-in default, so the daemon runs without a configuration file
//! at all.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::tables::DEFAULT_CONFIG_FILE;

/// Built-in configuration values.
pub mod defaults {
    /// Backend name pattern; empty matches every registered backend.
    pub const BACKEND: &str = "";
    /// Reboot-persistent storage (enabled markers).
    pub const REBOOT_PERSIST_DIR: &str = "/etc/config/xponmgrd/";
    /// Upgrade-persistent storage (PON passwords).
    pub const UPGRADE_PERSIST_DIR: &str = "/cfg/system/xponmgrd/";
    /// Highest ONU instance index the hardware supports.
    pub const MAX_ONUS: u32 = 4;
    /// Delay before a freshly scheduled task runs.
    pub const SHORT_TIMEOUT_MS: u64 = 100;
    /// Interval between re-checks of gated enable tasks.
    pub const ENABLE_RETRY_INTERVAL_MS: u64 = 1_000;
    /// Interval between ONU table queries during discovery.
    pub const QUERY_ONUS_INTERVAL_MS: u64 = 10_000;
    /// Number of ONU table queries before discovery gives up.
    pub const QUERY_ONUS_MAX_SWEEPS: u32 = 30;
    /// Re-checks before an ONU is enabled regardless of its children.
    pub const MAX_UNI_ANI_CHECKS: u8 = 4;
}

/// Complete xponmgrd configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Vendor backend name pattern. Candidates are registered backends
    /// whose name starts with this; exactly one must match.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Directory for reboot-persistent state. `None` disables the
    /// enabled marker store.
    #[serde(default = "default_reboot_persist_dir")]
    pub reboot_persist_dir: Option<PathBuf>,

    /// Directory for upgrade-persistent state. Falls back to
    /// `reboot_persist_dir` when its parent does not exist; `None`
    /// disables the password store.
    #[serde(default = "default_upgrade_persist_dir")]
    pub upgrade_persist_dir: Option<PathBuf>,

    /// Highest ONU instance index accepted in the schema tree.
    #[serde(default = "default_max_onus")]
    pub max_onus: u32,

    /// Delay in milliseconds before a freshly scheduled task runs.
    #[serde(default = "default_short_timeout_ms")]
    pub short_timeout_ms: u64,

    /// Interval in milliseconds between re-checks of ONUs whose
    /// interface instances have not shown up yet.
    #[serde(default = "default_enable_retry_interval_ms")]
    pub enable_retry_interval_ms: u64,

    /// Interval in milliseconds between ONU table queries while not
    /// all ONUs answered.
    #[serde(default = "default_query_onus_interval_ms")]
    pub query_onus_interval_ms: u64,

    /// Number of ONU table queries before giving up on absent ONUs.
    #[serde(default = "default_query_onus_max_sweeps")]
    pub query_onus_max_sweeps: u32,

    /// Number of re-checks before an ONU is enabled regardless of its
    /// interface instance counts.
    #[serde(default = "default_max_uni_ani_checks")]
    pub max_uni_ani_checks: u8,
}

fn default_backend() -> String {
    defaults::BACKEND.to_string()
}

fn default_reboot_persist_dir() -> Option<PathBuf> {
    Some(PathBuf::from(defaults::REBOOT_PERSIST_DIR))
}

fn default_upgrade_persist_dir() -> Option<PathBuf> {
    Some(PathBuf::from(defaults::UPGRADE_PERSIST_DIR))
}

fn default_max_onus() -> u32 {
    defaults::MAX_ONUS
}

fn default_short_timeout_ms() -> u64 {
    defaults::SHORT_TIMEOUT_MS
}

fn default_enable_retry_interval_ms() -> u64 {
    defaults::ENABLE_RETRY_INTERVAL_MS
}

fn default_query_onus_interval_ms() -> u64 {
    defaults::QUERY_ONUS_INTERVAL_MS
}

fn default_query_onus_max_sweeps() -> u32 {
    defaults::QUERY_ONUS_MAX_SWEEPS
}

fn default_max_uni_ani_checks() -> u8 {
    defaults::MAX_UNI_ANI_CHECKS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            reboot_persist_dir: default_reboot_persist_dir(),
            upgrade_persist_dir: default_upgrade_persist_dir(),
            max_onus: default_max_onus(),
            short_timeout_ms: default_short_timeout_ms(),
            enable_retry_interval_ms: default_enable_retry_interval_ms(),
            query_onus_interval_ms: default_query_onus_interval_ms(),
            query_onus_max_sweeps: default_query_onus_max_sweeps(),
            max_uni_ani_checks: default_max_uni_ani_checks(),
        }
    }
}

impl Config {
    /// Loads configuration from a file, falling back to defaults when
    /// the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = toml::from_str(&content)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "xponmgrd: config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => {
                Err(e).with_context(|| format!("failed to read config file {}", path.display()))
            }
        }
    }

    /// Loads from the default location or defaults.
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_FILE)
    }

    pub fn short_timeout(&self) -> Duration {
        Duration::from_millis(self.short_timeout_ms)
    }

    pub fn enable_retry_interval(&self) -> Duration {
        Duration::from_millis(self.enable_retry_interval_ms)
    }

    pub fn query_onus_interval(&self) -> Duration {
        Duration::from_millis(self.query_onus_interval_ms)
    }

    /// Validates configured values.
    pub fn validate(&self) -> Result<()> {
        if self.max_onus == 0 {
            bail!("max_onus must be > 0");
        }

        if self.short_timeout_ms == 0 {
            bail!("short_timeout_ms must be > 0");
        }

        if self.enable_retry_interval_ms == 0 {
            bail!("enable_retry_interval_ms must be > 0");
        }

        if self.query_onus_interval_ms == 0 {
            bail!("query_onus_interval_ms must be > 0");
        }

        if self.query_onus_max_sweeps == 0 {
            bail!("query_onus_max_sweeps must be > 0");
        }

        if self.max_uni_ani_checks == 0 {
            bail!("max_uni_ani_checks must be > 0");
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
        assert_eq!(config.backend, "");
        assert_eq!(
            config.reboot_persist_dir.as_deref(),
            Some(Path::new("/etc/config/xponmgrd/"))
        );
        assert_eq!(
            config.upgrade_persist_dir.as_deref(),
            Some(Path::new("/cfg/system/xponmgrd/"))
        );
        assert_eq!(config.max_onus, 4);
        assert_eq!(config.short_timeout_ms, 100);
        assert_eq!(config.enable_retry_interval_ms, 1_000);
        assert_eq!(config.query_onus_interval_ms, 10_000);
        assert_eq!(config.query_onus_max_sweeps, 30);
        assert_eq!(config.max_uni_ani_checks, 4);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_max_onus() {
        let mut config = Config::default();
        config.max_onus = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_short_timeout() {
        let mut config = Config::default();
        config.short_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_max_checks() {
        let mut config = Config::default();
        config.max_uni_ani_checks = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_helpers() {
        let config = Config::default();
        assert_eq!(config.short_timeout(), Duration::from_millis(100));
        assert_eq!(config.enable_retry_interval(), Duration::from_millis(1_000));
        assert_eq!(config.query_onus_interval(), Duration::from_millis(10_000));
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let toml_str = r#"
backend = "prpl"
max_onus = 8
query_onus_max_sweeps = 5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend, "prpl");
        assert_eq!(config.max_onus, 8);
        assert_eq!(config.query_onus_max_sweeps, 5);
        // Unspecified values keep their defaults.
        assert_eq!(config.query_onus_interval_ms, 10_000);
        assert_eq!(config.max_uni_ani_checks, 4);
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = Config::load_or_default("/nonexistent/xponmgrd.conf").unwrap();
        assert_eq!(config.max_onus, 4);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let toml_str = "query_onus_interval_ms = 0";
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }
}
