use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::Classification;
use crate::config::Credentials;
use crate::snapshot::{CoverState, DeviceStatus, PageCount, PrinterState, Supply, SystemInfo, TrayReading};

/// The data groups fetched during one refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    SystemInfo,
    DeviceInfo,
    CoverStatus,
    Supplies,
    InputTrays,
    DisplayText,
    PrinterErrors,
}

impl Query {
    pub fn key(&self) -> &'static str {
        match self {
            Query::SystemInfo => "system_info",
            Query::DeviceInfo => "device_info",
            Query::CoverStatus => "cover_status",
            Query::Supplies => "supplies",
            Query::InputTrays => "input_trays",
            Query::DisplayText => "display_text",
            Query::PrinterErrors => "printer_errors",
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("timeout waiting for response")]
    Timeout,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("authentication error: {0}")]
    Auth(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Other(String),
}

impl ClientError {
    /// Classification implied by the error kind itself. `None` means only the
    /// message text is available to decide.
    pub fn hint(&self) -> Option<Classification> {
        match self {
            ClientError::Timeout | ClientError::Connection(_) => Some(Classification::Unreachable),
            ClientError::Auth(_) | ClientError::Malformed(_) => Some(Classification::OtherFailure),
            ClientError::Other(_) => None,
        }
    }
}

/// Device-info reply: operational status plus the page counters the device
/// reports alongside it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub state: PrinterState,
    pub device_status: Option<String>,
    pub printer_status: Option<String>,
    #[serde(default)]
    pub detected_errors: Vec<String>,
    pub page_count: Option<u64>,
    pub page_counts: Option<PageCount>,
}

impl DeviceInfo {
    pub fn into_parts(self) -> (DeviceStatus, PageCount) {
        let page_count = self.page_counts.unwrap_or(PageCount {
            total: self.page_count,
            color: None,
            black_and_white: None,
        });
        let status = DeviceStatus {
            state: self.state,
            device_status: self.device_status,
            printer_status: self.printer_status,
            detected_errors: self.detected_errors,
        };
        (status, page_count)
    }
}

/// Device-management protocol client. Every call is idempotent and safe to
/// retry; each fails independently with a human-readable message.
#[async_trait]
pub trait PrinterClient: Send + Sync {
    async fn system_info(&self) -> Result<SystemInfo, ClientError>;
    async fn device_info(&self) -> Result<DeviceInfo, ClientError>;
    async fn cover_status(&self) -> Result<CoverState, ClientError>;
    async fn supplies(&self) -> Result<Vec<Supply>, ClientError>;
    async fn input_trays(&self) -> Result<Vec<TrayReading>, ClientError>;
    async fn display_text(&self) -> Result<Option<String>, ClientError>;
    async fn printer_errors(&self) -> Result<Option<String>, ClientError>;
}

#[derive(Debug, Deserialize)]
struct DeviceDump {
    community: Option<String>,
    username: Option<String>,
    #[serde(default)]
    system_info: SystemInfo,
    #[serde(default)]
    device_info: DeviceInfo,
    #[serde(default)]
    cover_status: CoverState,
    #[serde(default)]
    supplies: Vec<Supply>,
    #[serde(default)]
    input_trays: Vec<TrayReading>,
    display_text: Option<String>,
    errors: Option<String>,
    #[serde(default)]
    faults: BTreeMap<String, String>,
}

/// Answers every query from a JSON device dump. The file is re-read on each
/// call so a running monitor picks up edits; a missing file behaves like a
/// powered-off device.
#[derive(Debug, Clone)]
pub struct ReplayClient {
    path: PathBuf,
    credentials: Credentials,
}

impl ReplayClient {
    pub fn new(path: impl Into<PathBuf>, credentials: Credentials) -> Self {
        Self {
            path: path.into(),
            credentials,
        }
    }

    async fn load(&self, query: Query) -> Result<DeviceDump, ClientError> {
        let raw = tokio::fs::read(&self.path).await.map_err(|err| {
            ClientError::Connection(format!("connection refused by {}: {err}", self.path.display()))
        })?;
        let dump: DeviceDump =
            serde_json::from_slice(&raw).map_err(|err| ClientError::Malformed(err.to_string()))?;

        self.authenticate(&dump)?;

        if let Some(message) = dump.faults.get(query.key()) {
            return Err(ClientError::Other(message.clone()));
        }
        Ok(dump)
    }

    fn authenticate(&self, dump: &DeviceDump) -> Result<(), ClientError> {
        match &self.credentials {
            Credentials::V1 { community } | Credentials::V2c { community } => match &dump.community {
                Some(expected) if expected != community => {
                    Err(ClientError::Auth("authentication failed: community rejected".to_string()))
                }
                _ => Ok(()),
            },
            Credentials::V3 { username, .. } => match &dump.username {
                Some(expected) if expected != username => {
                    Err(ClientError::Auth(format!("authentication failed: unknown user {username}")))
                }
                _ => Ok(()),
            },
        }
    }
}

#[async_trait]
impl PrinterClient for ReplayClient {
    async fn system_info(&self) -> Result<SystemInfo, ClientError> {
        Ok(self.load(Query::SystemInfo).await?.system_info)
    }

    async fn device_info(&self) -> Result<DeviceInfo, ClientError> {
        Ok(self.load(Query::DeviceInfo).await?.device_info)
    }

    async fn cover_status(&self) -> Result<CoverState, ClientError> {
        Ok(self.load(Query::CoverStatus).await?.cover_status)
    }

    async fn supplies(&self) -> Result<Vec<Supply>, ClientError> {
        Ok(self.load(Query::Supplies).await?.supplies)
    }

    async fn input_trays(&self) -> Result<Vec<TrayReading>, ClientError> {
        Ok(self.load(Query::InputTrays).await?.input_trays)
    }

    async fn display_text(&self) -> Result<Option<String>, ClientError> {
        Ok(self.load(Query::DisplayText).await?.display_text)
    }

    async fn printer_errors(&self) -> Result<Option<String>, ClientError> {
        Ok(self.load(Query::PrinterErrors).await?.errors)
    }
}
