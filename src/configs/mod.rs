use crate::error::AppResult;
use config::{Config, ConfigError, Environment as ConfigEnv, File as ConfigFile};
use duration_str::deserialize_duration;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

mod identity;

pub use identity::IdentityPaths;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_LISTEN_PORT: u16 = 443;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct GlobalConfig {
    pub workers: Option<usize>,

    #[serde(default)]
    pub mode: Mode,

    #[serde(default)]
    pub identity: IdentityPaths,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Fallback for `client.target`, read from `HELLO_MTLS_URL`.
    #[serde(default)]
    pub url: Option<String>,
}

impl GlobalConfig {
    pub fn load_config() -> AppResult<Self> {
        let cfg = Config::builder()
            .add_source(ConfigFile::with_name("/etc/hello-mtls/config").required(false))
            .add_source(ConfigFile::with_name("config").required(false))
            .add_source(
                ConfigEnv::with_prefix("HELLO_MTLS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        Self::from_config(cfg)
    }

    fn from_config(cfg: Config) -> AppResult<Self> {
        let mut cfg: Self = cfg.try_deserialize()?;
        if cfg.client.target.is_none() {
            cfg.client.target = cfg.url.take();
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh.interval.is_zero() {
            return Err(ConfigError::Message(
                "refresh.interval must be greater than zero".to_owned(),
            ));
        }
        if self.client.request_interval.is_zero() {
            return Err(ConfigError::Message(
                "client.request_interval must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Server,
    Client,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RefreshConfig {
    #[serde(
        default = "default_refresh_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: default_refresh_interval(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClientConfig {
    /// `host:port` of the greeter server.
    #[serde(default)]
    pub target: Option<String>,

    /// Overrides the host of `target` for SNI and certificate verification.
    #[serde(default)]
    pub server_name: Option<String>,

    #[serde(default = "default_name")]
    pub name: String,

    #[serde(
        default = "default_request_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub request_interval: Duration,

    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target: None,
            server_name: None,
            name: default_name(),
            request_interval: default_request_interval(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Metrics are only served when an address is configured.
    #[serde(default)]
    pub listen: Option<SocketAddr>,
}

const fn default_refresh_interval() -> Duration {
    DEFAULT_REFRESH_INTERVAL
}

const fn default_request_interval() -> Duration {
    DEFAULT_REQUEST_INTERVAL
}

pub(crate) const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_LISTEN_PORT))
}

fn default_name() -> String {
    "world".to_owned()
}
