use crate::error::{AdminError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE: &str = "mailconf";
/// Name of the key pair file inside the config directory.
pub const KEYS_FILE: &str = "keys";

const ENV_PREFIX: &str = "MAILWEBADMIN";

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub config_dir: PathBuf,
    pub port: u16,
    /// Mail directory pattern, `%d` is the domain and `%n` the user part.
    pub maildir: String,
    /// Remove mail directories when a domain or user is deleted.
    pub delete: bool,
    /// Directory for zip backups, `None` disables backups.
    pub backup: Option<PathBuf>,
    pub static_dir: PathBuf,
    pub database: DatabaseConfig,
    pub session_lifespan: Duration,
    pub invalid_keys_interval: Duration,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://mailwebadmin.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// On-disk layout of `mailconf`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    port: Option<u16>,
    maildir: Option<String>,
    delete: bool,
    backup: Option<String>,
    #[serde(rename = "static-dir")]
    static_dir: Option<String>,
    database: DatabaseConfig,
    timers: RawTimers,
    logging: LoggingConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTimers {
    #[serde(rename = "session-lifespan")]
    session_lifespan: Option<String>,
    #[serde(rename = "invalid-keys")]
    invalid_keys: Option<String>,
}

impl Config {
    pub const DEFAULT_PORT: u16 = 80;
    pub const DEFAULT_MAILDIR: &'static str = "/var/vmail/%d/%n";
    pub const DEFAULT_SESSION_LIFESPAN: Duration = Duration::from_secs(7 * 24 * 3600);
    pub const DEFAULT_INVALID_KEYS_INTERVAL: Duration = Duration::from_secs(24 * 3600);

    /// Load `mailconf` from the config directory, with `MAILWEBADMIN__*`
    /// environment variables overriding file values.
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();
        let path = config_dir.join(CONFIG_FILE);
        let path_str = path
            .to_str()
            .ok_or_else(|| AdminError::Config(format!("non UTF-8 path {}", path.display())))?;

        let settings = config::Config::builder()
            .add_source(config::File::new(path_str, config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AdminError::Config(e.to_string()))?;
        let raw: RawConfig = settings
            .try_deserialize()
            .map_err(|e| AdminError::Config(e.to_string()))?;

        Self::resolve(config_dir, raw)
    }

    /// Parse configuration from a TOML string, no environment overrides.
    pub fn from_toml_str<P: AsRef<Path>>(config_dir: P, content: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()
            .map_err(|e| AdminError::Config(e.to_string()))?;
        let raw: RawConfig = settings
            .try_deserialize()
            .map_err(|e| AdminError::Config(e.to_string()))?;

        Self::resolve(config_dir.as_ref().to_path_buf(), raw)
    }

    fn resolve(config_dir: PathBuf, raw: RawConfig) -> Result<Self> {
        let maildir = raw
            .maildir
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_MAILDIR.to_string());
        if !maildir.contains("%d") || !maildir.contains("%n") {
            return Err(AdminError::Config(
                "Invalid maildir in conf: Must contain %d and %n".to_string(),
            ));
        }

        let session_lifespan = parse_timer(
            raw.timers.session_lifespan.as_deref(),
            Self::DEFAULT_SESSION_LIFESPAN,
        )?;
        let invalid_keys_interval = parse_timer(
            raw.timers.invalid_keys.as_deref(),
            Self::DEFAULT_INVALID_KEYS_INTERVAL,
        )?;

        Ok(Self {
            config_dir,
            port: raw.port.filter(|p| *p != 0).unwrap_or(Self::DEFAULT_PORT),
            maildir,
            delete: raw.delete,
            backup: raw.backup.filter(|b| !b.is_empty()).map(PathBuf::from),
            static_dir: PathBuf::from(raw.static_dir.unwrap_or_else(|| "static".to_string())),
            database: raw.database,
            session_lifespan,
            invalid_keys_interval,
            logging: raw.logging,
        })
    }

    pub fn keys_path(&self) -> PathBuf {
        self.config_dir.join(KEYS_FILE)
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

/// Missing, empty and zero durations fall back to the default.
fn parse_timer(value: Option<&str>, default: Duration) -> Result<Duration> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(text) => {
            let parsed = parse_duration(text)?;
            Ok(if parsed.is_zero() { default } else { parsed })
        }
    }
}

/// Parse durations like `168h`, `1h30m`, `45s` or `250ms`.
pub fn parse_duration(text: &str) -> Result<Duration> {
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(text)
        .map_err(|e| AdminError::Config(format!("invalid duration \"{}\": {}", text, e)))
}
