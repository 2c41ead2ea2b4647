use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub description: Option<String>,
    pub location: Option<String>,
    pub contact: Option<String>,
    /// Hundredths of a second since the management agent started.
    pub uptime: Option<u64>,
    pub serial_number: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterState {
    Idle,
    Printing,
    WarmingUp,
    #[default]
    Unknown,
}

impl PrinterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrinterState::Idle => "idle",
            PrinterState::Printing => "printing",
            PrinterState::WarmingUp => "warming_up",
            PrinterState::Unknown => "unknown",
        }
    }
}

/// Operational status as reported by the device-info query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub state: PrinterState,
    pub device_status: Option<String>,
    pub printer_status: Option<String>,
    #[serde(default)]
    pub detected_errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverState {
    Open,
    Closed,
    #[default]
    Unknown,
}

impl CoverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverState::Open => "open",
            CoverState::Closed => "closed",
            CoverState::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverStatus {
    pub state: CoverState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCount {
    pub total: Option<u64>,
    pub color: Option<u64>,
    pub black_and_white: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supply {
    pub index: u32,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub color: String,
    pub percentage: Option<u8>,
}

/// Raw input-tray reading as returned by the protocol client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrayReading {
    pub index: u32,
    pub description: String,
    pub status: Option<String>,
    pub media_name: Option<String>,
    pub max_capacity: Option<i64>,
    pub current_level: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tray {
    pub index: u32,
    pub description: String,
    pub status: Option<String>,
    pub media_name: Option<String>,
    pub max_capacity: Option<i64>,
    pub current_level: Option<i64>,
    pub percentage: Option<u8>,
}

impl From<TrayReading> for Tray {
    fn from(reading: TrayReading) -> Self {
        let percentage = tray_percentage(reading.max_capacity, reading.current_level);
        Self {
            index: reading.index,
            description: reading.description,
            status: reading.status,
            media_name: reading.media_name,
            max_capacity: reading.max_capacity,
            current_level: reading.current_level,
            percentage,
        }
    }
}

// Negative capacities and levels are the device's "unknown"/"other" sentinels.
fn tray_percentage(max_capacity: Option<i64>, current_level: Option<i64>) -> Option<u8> {
    let max = max_capacity.filter(|v| *v > 0)?;
    let level = current_level.filter(|v| *v >= 0)?;
    let pct = (level.min(max) as f64 / max as f64 * 100.0).round();
    Some(pct as u8)
}

/// One complete capture of device state, as produced by a single cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterData {
    pub info: SystemInfo,
    pub status: DeviceStatus,
    pub cover_status: CoverStatus,
    pub page_count: PageCount,
    pub supplies: Vec<Supply>,
    pub input_trays: Vec<Tray>,
    pub display_text: Option<String>,
    pub errors: Option<String>,
    #[serde(default)]
    pub web_interface_available: bool,
}

/// Published state. Either fully fresh or a cached capture republished as
/// stale; `offline_since` is set exactly when `is_online` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    #[serde(flatten)]
    data: PrinterData,
    is_online: bool,
    offline_since: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn fresh(data: PrinterData) -> Self {
        Self {
            data,
            is_online: true,
            offline_since: None,
        }
    }

    /// `captured_at` is the capture time of `data`, never the failure time.
    pub fn stale(data: PrinterData, captured_at: DateTime<Utc>) -> Self {
        Self {
            data,
            is_online: false,
            offline_since: Some(captured_at),
        }
    }

    pub fn data(&self) -> &PrinterData {
        &self.data
    }

    pub fn is_online(&self) -> bool {
        self.is_online
    }

    pub fn offline_since(&self) -> Option<DateTime<Utc>> {
        self.offline_since
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading(max: Option<i64>, level: Option<i64>) -> TrayReading {
        TrayReading {
            index: 1,
            description: "Tray 1".to_string(),
            status: None,
            media_name: None,
            max_capacity: max,
            current_level: level,
        }
    }

    #[test]
    fn tray_percentage_derived_from_levels() {
        assert_eq!(Tray::from(reading(Some(250), Some(125))).percentage, Some(50));
        assert_eq!(Tray::from(reading(Some(3), Some(1))).percentage, Some(33));
        assert_eq!(Tray::from(reading(Some(100), Some(150))).percentage, Some(100));
    }

    #[test]
    fn tray_percentage_absent_without_usable_levels() {
        assert_eq!(Tray::from(reading(None, Some(10))).percentage, None);
        assert_eq!(Tray::from(reading(Some(250), None)).percentage, None);
        assert_eq!(Tray::from(reading(Some(-2), Some(10))).percentage, None);
        assert_eq!(Tray::from(reading(Some(250), Some(-3))).percentage, None);
        assert_eq!(Tray::from(reading(Some(0), Some(0))).percentage, None);
    }

    #[test]
    fn fresh_and_stale_keep_availability_consistent() {
        let fresh = Snapshot::fresh(PrinterData::default());
        assert!(fresh.is_online());
        assert!(fresh.offline_since().is_none());

        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).single().expect("valid date");
        let stale = Snapshot::stale(fresh.data().clone(), ts);
        assert!(!stale.is_online());
        assert_eq!(stale.offline_since(), Some(ts));
        assert_eq!(stale.data(), fresh.data());
    }

    #[test]
    fn snapshot_serializes_flat_with_availability() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).single().expect("valid date");
        let value = serde_json::to_value(Snapshot::stale(PrinterData::default(), ts)).expect("serialize");

        assert_eq!(value["is_online"], serde_json::json!(false));
        assert_eq!(value["offline_since"], serde_json::json!("2026-03-01T08:30:00Z"));
        assert_eq!(value["status"]["state"], serde_json::json!("unknown"));
        assert!(value.get("data").is_none());
    }
}
