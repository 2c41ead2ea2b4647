use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 161;
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
/// Floor for the refresh interval so a misconfigured entry cannot hammer the device.
pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("host must not be empty")]
    EmptyHost,
    #[error("port must be non-zero")]
    InvalidPort,
    #[error("community string must not be empty")]
    EmptyCommunity,
    #[error("v3 credentials require a username")]
    EmptyUsername,
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub update_interval: Duration,
    pub query_timeout: Duration,
    pub store_timeout: Duration,
    pub probe_web_interface: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            query_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
            probe_web_interface: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn normalized(mut self) -> Self {
        if self.update_interval < MIN_UPDATE_INTERVAL {
            warn!(
                requested_secs = self.update_interval.as_secs_f64(),
                min_secs = MIN_UPDATE_INTERVAL.as_secs(),
                "update interval below minimum, clamping"
            );
            self.update_interval = MIN_UPDATE_INTERVAL;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "version", rename_all = "lowercase")]
pub enum Credentials {
    V1 {
        community: String,
    },
    V2c {
        community: String,
    },
    V3 {
        username: String,
        auth_protocol: Option<String>,
        auth_key: Option<String>,
        priv_protocol: Option<String>,
        priv_key: Option<String>,
    },
}

impl Default for Credentials {
    fn default() -> Self {
        Credentials::V2c {
            community: "public".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub update_interval_secs: Option<u64>,
    /// Device dump answered by the bundled replay client.
    #[serde(default)]
    pub dump: Option<PathBuf>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            credentials: Credentials::default(),
            update_interval_secs: None,
            dump: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        match &self.credentials {
            Credentials::V1 { community } | Credentials::V2c { community } if community.is_empty() => {
                Err(ConfigError::EmptyCommunity)
            }
            Credentials::V3 { username, .. } if username.trim().is_empty() => Err(ConfigError::EmptyUsername),
            _ => Ok(()),
        }
    }

    pub fn device_identity(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn coordinator_config(&self, base: &CoordinatorConfig) -> CoordinatorConfig {
        let mut config = base.clone();
        if let Some(secs) = self.update_interval_secs {
            config.update_interval = Duration::from_secs(secs);
        }
        config.normalized()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl FleetConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: FleetConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        for device in &config.devices {
            device.validate()?;
        }
        Ok(config)
    }
}
