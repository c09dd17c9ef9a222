use netwatch_probes::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Runtime settings, every field overridable from the environment (or `.env`).
///
/// | Variable                         | Default               |
/// |----------------------------------|-----------------------|
/// | `NETWATCH_PING_INTERVAL`         | `30s`                 |
/// | `NETWATCH_UNREACHABLE_THRESHOLD` | `2`                   |
/// | `NETWATCH_INITIAL_DELAY`         | `5m`                  |
/// | `NETWATCH_ALERT_COOLDOWN`        | `1h`                  |
/// | `NETWATCH_REGISTRY_BACKOFF`      | `10s`                 |
/// | `NETWATCH_DEVICES`               | `config/devices.yaml` |
/// | `NETWATCH_EMAIL_CONFIG`          | `config/email.yaml`   |
/// | `NETWATCH_LISTEN`                | `0.0.0.0:5000`        |
/// | `NETWATCH_PING_TIMEOUT`          | `1s`                  |
/// | `NETWATCH_SNMP_COMMUNITY`        | `public`              |
/// | `NETWATCH_SNMP_TIMEOUT`          | `2s`                  |
/// | `NETWATCH_SNMP_RETRIES`          | `3`                   |
/// | `NETWATCH_STARTUP_NOTICE`        | `true`                |
/// | `LOG_DIR`                        | unset (stdout only)   |
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub poll_interval: Duration,
    pub unreachable_threshold: u32,
    pub initial_delay: Duration,
    pub alert_cooldown: Duration,
    pub registry_backoff: Duration,
    pub devices_path: PathBuf,
    pub email_config_path: PathBuf,
    pub listen: SocketAddr,
    pub ping_timeout: Duration,
    pub snmp_community: String,
    pub snmp_timeout: Duration,
    pub snmp_retries: u32,
    pub startup_notice: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            unreachable_threshold: 2,
            initial_delay: Duration::from_secs(5 * 60),
            alert_cooldown: Duration::from_secs(60 * 60),
            registry_backoff: Duration::from_secs(10),
            devices_path: PathBuf::from("config/devices.yaml"),
            email_config_path: PathBuf::from("config/email.yaml"),
            listen: SocketAddr::from(([0, 0, 0, 0], 5000)),
            ping_timeout: Duration::from_secs(1),
            snmp_community: "public".into(),
            snmp_timeout: Duration::from_secs(2),
            snmp_retries: 3,
            startup_notice: true,
            log_dir: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut s = Settings::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("NETWATCH_PING_INTERVAL") {
            s.poll_interval = parse_duration("NETWATCH_PING_INTERVAL", &v)?;
        }
        if let Some(v) = var("NETWATCH_UNREACHABLE_THRESHOLD") {
            s.unreachable_threshold = parse_value("NETWATCH_UNREACHABLE_THRESHOLD", &v)?;
        }
        if let Some(v) = var("NETWATCH_INITIAL_DELAY") {
            s.initial_delay = parse_duration("NETWATCH_INITIAL_DELAY", &v)?;
        }
        if let Some(v) = var("NETWATCH_ALERT_COOLDOWN") {
            s.alert_cooldown = parse_duration("NETWATCH_ALERT_COOLDOWN", &v)?;
        }
        if let Some(v) = var("NETWATCH_REGISTRY_BACKOFF") {
            s.registry_backoff = parse_duration("NETWATCH_REGISTRY_BACKOFF", &v)?;
        }
        if let Some(v) = var("NETWATCH_DEVICES") {
            s.devices_path = PathBuf::from(v);
        }
        if let Some(v) = var("NETWATCH_EMAIL_CONFIG") {
            s.email_config_path = PathBuf::from(v);
        }
        if let Some(v) = var("NETWATCH_LISTEN") {
            s.listen = parse_value("NETWATCH_LISTEN", &v)?;
        }
        if let Some(v) = var("NETWATCH_PING_TIMEOUT") {
            s.ping_timeout = parse_duration("NETWATCH_PING_TIMEOUT", &v)?;
        }
        if let Some(v) = var("NETWATCH_SNMP_COMMUNITY") {
            s.snmp_community = v;
        }
        if let Some(v) = var("NETWATCH_SNMP_TIMEOUT") {
            s.snmp_timeout = parse_duration("NETWATCH_SNMP_TIMEOUT", &v)?;
        }
        if let Some(v) = var("NETWATCH_SNMP_RETRIES") {
            s.snmp_retries = parse_value("NETWATCH_SNMP_RETRIES", &v)?;
        }
        if let Some(v) = var("NETWATCH_STARTUP_NOTICE") {
            s.startup_notice = parse_value("NETWATCH_STARTUP_NOTICE", &v)?;
        }
        if let Some(v) = var("LOG_DIR") {
            s.log_dir = Some(PathBuf::from(v));
        }

        if s.unreachable_threshold == 0 {
            return Err(ConfigError::Invalid {
                var: "NETWATCH_UNREACHABLE_THRESHOLD",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        if s.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "NETWATCH_PING_INTERVAL",
                value: "0s".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(s)
    }

    /// `NETWATCH_SNMP_RETRIES` counts retries, so the first query comes on top.
    pub fn snmp_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.snmp_retries.saturating_add(1),
            ..RetryPolicy::default()
        }
    }
}

fn parse_duration(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_value<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct EmailFile {
    smtp: SmtpConf,
}

/// `email.yaml` -> `smtp:` section. The password never lives in the file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SmtpConf {
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub sender: String,
    pub recipient: String,
    #[serde(skip)]
    pub password: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

/// Loads the SMTP settings; `Ok(None)` when the file does not exist.
pub async fn load_email_config(path: &Path) -> Result<Option<SmtpConf>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: EmailFile = serde_yaml::from_str(&txt).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;

    let mut smtp = file.smtp;
    smtp.password = std::env::var("EMAIL_PASSWORD").ok().filter(|p| !p.is_empty());
    Ok(Some(smtp))
}
