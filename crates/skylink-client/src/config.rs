//! Engine configuration and settings files.
//!
//! Settings live in a TOML file, `~/.config/skylink/config.toml` by default:
//!
//! ```toml
//! [broker]
//! url = "wr://s3cr3t@127.0.0.1:8081/test"
//!
//! [worker]
//! heartbeat_interval_ms = 2000
//! ```
//!
//! Instead of `url`, the broker can be given as `address`, `vhost` and
//! `secret`; the explicit `secret` supports `env::` and `pass::` references
//! (see [`crate::secret`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::secret::{self, SecretError};

/// Default request and response timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);
/// Default worker heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(2000);
/// Default pause before a worker reconnects.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(2000);
/// Silent poll windows tolerated before a worker reconnects.
pub const DEFAULT_LIVENESS: u32 = 3;

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid broker url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("broker {0} is not configured")]
    Missing(&'static str),

    #[error(transparent)]
    Secret(#[from] SecretError),
}

/// Timing for [`crate::Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Upper bound for handing a request to the transport.
    pub request_timeout: Duration,
    /// Upper bound for waiting on the reply.
    pub response_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_TIMEOUT,
            response_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

/// Timing for [`crate::Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Interval between heartbeats. A poll window lasts twice as long.
    pub heartbeat_interval: Duration,
    /// Pause before reopening a dead connection.
    pub reconnect_interval: Duration,
    /// Silent poll windows tolerated before reconnecting.
    pub liveness: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            liveness: DEFAULT_LIVENESS,
        }
    }
}

impl WorkerConfig {
    /// Set the heartbeat interval (at least 1ms).
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the liveness threshold (at least 1).
    pub fn with_liveness(mut self, liveness: u32) -> Self {
        self.liveness = liveness.max(1);
        self
    }

    /// Length of one poll window.
    pub fn poll_window(&self) -> Duration {
        self.heartbeat_interval * 2
    }
}

/// Broker coordinates from a `wr://<secret>@<host>:<port>/<vhost>` url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerUrl {
    /// Transport address, `tcp://host:port`.
    pub address: String,
    pub vhost: String,
    pub secret: String,
}

impl BrokerUrl {
    pub fn parse(input: &str) -> Result<Self, SettingsError> {
        let invalid = |reason: &str| SettingsError::InvalidUrl {
            url: input.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(input).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "wr" {
            return Err(invalid("scheme must be wr"));
        }

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("missing host"))?;
        let port = url.port().ok_or_else(|| invalid("missing port"))?;

        let mut secret = decode(url.username()).map_err(|_| invalid("secret is not UTF-8"))?;
        if let Some(rest) = url.password() {
            let rest = decode(rest).map_err(|_| invalid("secret is not UTF-8"))?;
            secret = format!("{secret}:{rest}");
        }
        if secret.is_empty() {
            return Err(invalid("missing secret"));
        }

        let vhost = url.path();
        if vhost.is_empty() || vhost == "/" {
            return Err(invalid("missing vhost"));
        }

        Ok(Self {
            address: format!("tcp://{host}:{port}"),
            vhost: vhost.to_string(),
            secret,
        })
    }
}

fn decode(value: &str) -> Result<String, std::string::FromUtf8Error> {
    urlencoding::decode(value).map(|decoded| decoded.into_owned())
}

/// Contents of a settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub client: ClientSettings,
    pub worker: WorkerSettings,
}

/// `[broker]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// `wr://` url; takes precedence over the explicit fields.
    pub url: Option<String>,
    pub address: Option<String>,
    pub vhost: Option<String>,
    /// Secret or secret reference.
    pub secret: Option<String>,
}

/// `[client]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub request_timeout_ms: u64,
    pub response_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            response_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

/// `[worker]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub heartbeat_interval_ms: u64,
    pub reconnect_interval_ms: u64,
    pub liveness: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL.as_millis() as u64,
            liveness: DEFAULT_LIVENESS,
        }
    }
}

impl Settings {
    /// Load from the default path; a missing file yields defaults.
    pub fn load() -> Result<Self, SettingsError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skylink")
            .join("config.toml")
    }

    /// Resolve the broker coordinates, expanding secret references.
    pub fn broker_url(&self) -> Result<BrokerUrl, SettingsError> {
        if let Some(url) = &self.broker.url {
            return BrokerUrl::parse(url);
        }

        let address = self
            .broker
            .address
            .clone()
            .ok_or(SettingsError::Missing("address"))?;
        let vhost = self
            .broker
            .vhost
            .clone()
            .ok_or(SettingsError::Missing("vhost"))?;
        let secret = self
            .broker
            .secret
            .as_deref()
            .ok_or(SettingsError::Missing("secret"))?;

        Ok(BrokerUrl {
            address,
            vhost,
            secret: secret::resolve(secret)?,
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_request_timeout(Duration::from_millis(self.client.request_timeout_ms))
            .with_response_timeout(Duration::from_millis(self.client.response_timeout_ms))
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default()
            .with_heartbeat_interval(Duration::from_millis(self.worker.heartbeat_interval_ms))
            .with_reconnect_interval(Duration::from_millis(self.worker.reconnect_interval_ms))
            .with_liveness(self.worker.liveness)
    }
}
