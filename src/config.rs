//! Server configuration module.
//!
//! Handles loading, validating, and merging the TOML config file. Stock
//! defaults are the base layer; a config file overrides them, the
//! `MEDIA_PASS` environment variable overrides the file's password, and CLI
//! flags override everything.
//!
//! ## Config File Location
//!
//! Pass `--config FILE`, or place `media-store.toml` in the working directory.
//! Without either, stock defaults are used.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [server]
//! bind = "0.0.0.0:5555"     # Listen address
//!
//! [storage]
//! data_dir = "./data/"      # Blob + sidecar directory
//!
//! [cache]
//! capacity = 512            # Entries, not bytes
//!
//! [auth]
//! write_pass = ""           # Shared secret for /manage; empty denies all writes
//!
//! [processing]
//! max_threads = 4           # Pixel worker threads (omit for auto = CPU cores)
//!
//! [logging]
//! filter = "info"           # tracing EnvFilter directive; RUST_LOG wins
//! json = false              # JSON log lines instead of plain text
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [cache]
//! capacity = 4096
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "media-store.toml";

/// Environment variable that overrides `auth.write_pass`.
pub const PASSWORD_ENV: &str = "MEDIA_PASS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
    pub processing: ProcessingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5555".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/"),
        }
    }
}

/// Eviction cache sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum number of entries. Every entry counts as one, whatever its size.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 512 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Shared secret expected in the `x-auth` header. Empty disables writes.
    pub write_pass: String,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of pixel worker threads.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_threads: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
        }
    }
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.capacity == 0 {
            return Err(ConfigError::Validation(
                "cache.capacity must be greater than 0".into(),
            ));
        }
        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "server.bind `{}` is not a socket address",
                self.server.bind
            )));
        }
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "storage.data_dir must not be empty".into(),
            ));
        }
        if self.processing.max_threads == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_threads must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parsed listen address. Call after [`Config::validate`].
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|e| ConfigError::Validation(format!("server.bind: {e}")))
    }

    /// Apply environment overrides. A set but empty variable is ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(pass) = lookup(PASSWORD_ENV).filter(|p| !p.is_empty()) {
            self.auth.write_pass = pass;
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Config::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<Config, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, or from [`DEFAULT_CONFIG_FILE`] in `cwd` when
/// `path` is `None`.
///
/// An explicit path must exist. The implicit file is optional.
pub fn load_config(path: Option<&Path>, cwd: &Path) -> Result<Config, ConfigError> {
    let overlay = match path {
        Some(path) => Some(load_raw_config(path)?),
        None => {
            let implicit = cwd.join(DEFAULT_CONFIG_FILE);
            if implicit.exists() {
                Some(load_raw_config(&implicit)?)
            } else {
                None
            }
        }
    };
    resolve_config(stock_defaults_value()?, overlay)
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Media Store Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Precedence, highest first:
#   CLI flags > MEDIA_PASS environment variable > this file > stock defaults
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# HTTP server
# ---------------------------------------------------------------------------
[server]
# Address and port to listen on.
bind = "0.0.0.0:5555"

# ---------------------------------------------------------------------------
# Object storage
# ---------------------------------------------------------------------------
[storage]
# Directory holding one blob and one <key>.json sidecar per object.
# Created on startup if missing.
data_dir = "./data/"

# ---------------------------------------------------------------------------
# Eviction cache
# ---------------------------------------------------------------------------
[cache]
# Maximum number of cached entries (raw blobs, metadata and derived images
# all count as one entry each). Must be greater than 0.
capacity = 512

# ---------------------------------------------------------------------------
# Write authentication
# ---------------------------------------------------------------------------
[auth]
# Shared secret expected in the x-auth header on /manage requests.
# Leave empty to reject every write. MEDIA_PASS overrides this value.
write_pass = ""

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum worker threads for pixel operations.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_threads = 4

# ---------------------------------------------------------------------------
# Logging
# ---------------------------------------------------------------------------
[logging]
# tracing filter directive, e.g. "info" or "media_store=debug".
# The RUST_LOG environment variable takes precedence when set.
filter = "info"

# Emit one JSON object per log line.
json = false
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // =========================================================================
    // Defaults and parsing
    // =========================================================================

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:5555");
        assert_eq!(config.storage.data_dir, PathBuf::from("./data/"));
        assert_eq!(config.cache.capacity, 512);
        assert_eq!(config.auth.write_pass, "");
        assert_eq!(config.processing.max_threads, None);
        assert_eq!(config.logging.filter, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn parse_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            capacity = 64
        "#,
        )
        .unwrap();
        assert_eq!(config.cache.capacity, 64);
        assert_eq!(config.server.bind, "0.0.0.0:5555");
    }

    #[test]
    fn validate_default_config_passes() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.cache.capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache.capacity"));
    }

    #[test]
    fn validate_rejects_bad_bind() {
        let mut config = Config::default();
        config.server.bind = "localhost".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_data_dir_and_zero_threads() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::new();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.processing.max_threads = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn bind_addr_parses() {
        let addr = Config::default().bind_addr().unwrap();
        assert_eq!(addr.port(), 5555);
    }

    // =========================================================================
    // Environment overrides
    // =========================================================================

    #[test]
    fn env_password_overrides_file() {
        let mut config = Config::default();
        config.auth.write_pass = "from-file".into();
        config.apply_env(|name| (name == PASSWORD_ENV).then(|| "from-env".to_string()));
        assert_eq!(config.auth.write_pass, "from-env");
    }

    #[test]
    fn empty_env_password_is_ignored() {
        let mut config = Config::default();
        config.auth.write_pass = "from-file".into();
        config.apply_env(|_| Some(String::new()));
        assert_eq!(config.auth.write_pass, "from-file");
        config.apply_env(|_| None);
        assert_eq!(config.auth.write_pass, "from-file");
    }

    // =========================================================================
    // effective_threads
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_threads: Some(99999),
        };
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_threads: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("a = 1").unwrap();
        let overlay: toml::Value = toml::from_str("a = 2").unwrap();
        assert_eq!(merge_toml(base, overlay)["a"].as_integer(), Some(2));
    }

    #[test]
    fn merge_toml_preserves_base_keys() {
        let base: toml::Value = toml::from_str(
            r#"
            [cache]
            capacity = 1
            [server]
            bind = "x"
        "#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
            [cache]
            capacity = 2
        "#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["cache"]["capacity"].as_integer(), Some(2));
        assert_eq!(merged["server"]["bind"].as_str(), Some("x"));
    }

    // =========================================================================
    // Loading
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(None, tmp.path()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_config_reads_implicit_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(DEFAULT_CONFIG_FILE),
            "[auth]\nwrite_pass = \"s3cret\"\n",
        )
        .unwrap();
        let config = load_config(None, tmp.path()).unwrap();
        assert_eq!(config.auth.write_pass, "s3cret");
        assert_eq!(config.cache.capacity, 512);
    }

    #[test]
    fn load_config_explicit_path_must_exist() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        assert!(matches!(
            load_config(Some(&missing), tmp.path()),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        fs::write(&path, "this is not toml [[[").unwrap();
        assert!(matches!(
            load_config(Some(&path), tmp.path()),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn unknown_key_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("typo.toml");
        fs::write(&path, "[cache]\ncapacty = 10\n").unwrap();
        assert!(load_config(Some(&path), tmp.path()).is_err());
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<Config, _> = toml::from_str("[metrics]\nenabled = true\n");
        assert!(result.is_err());
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("zero.toml");
        fs::write(&path, "[cache]\ncapacity = 0\n").unwrap();
        assert!(matches!(
            load_config(Some(&path), tmp.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    // =========================================================================
    // Stock config
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: Config = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let text = stock_config_toml();
        for section in [
            "[server]",
            "[storage]",
            "[cache]",
            "[auth]",
            "[processing]",
            "[logging]",
        ] {
            assert!(text.contains(section), "missing {section}");
        }
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let value = stock_defaults_value().unwrap();
        let table = value.as_table().unwrap();
        for key in ["server", "storage", "cache", "auth", "processing", "logging"] {
            assert!(table.contains_key(key), "missing {key}");
        }
    }
}
