use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{CacheRecord, SnapshotStore};
use crate::client::{ClientError, DeviceInfo, PrinterClient, Query};
use crate::error::PersistenceError;
use crate::snapshot::{CoverState, PrinterState, Supply, SystemInfo, TrayReading};

pub fn black_toner(percentage: u8) -> Supply {
    Supply {
        index: 1,
        description: "Black Cartridge HP W2030A".to_string(),
        kind: "toner".to_string(),
        color: "Black".to_string(),
        percentage: Some(percentage),
    }
}

struct Script {
    system_info: SystemInfo,
    device_info: DeviceInfo,
    cover: CoverState,
    supplies: Vec<Supply>,
    trays: Vec<TrayReading>,
    display_text: Option<String>,
    errors: Option<String>,
    failures: HashMap<Query, ClientError>,
    delay: Duration,
}

/// In-process printer whose replies and failures are set by the test.
#[derive(Clone)]
pub struct ScriptedClient {
    script: Arc<Mutex<Script>>,
    cycles: Arc<AtomicUsize>,
}

impl ScriptedClient {
    pub fn healthy() -> Self {
        let script = Script {
            system_info: SystemInfo {
                description: Some("HP ETHERNET MULTI-ENVIRONMENT,PID:HP LaserJet Pro M404dn".to_string()),
                location: Some("2nd floor".to_string()),
                contact: Some("it@example.com".to_string()),
                uptime: Some(360_000),
                serial_number: Some("PHBBK12345".to_string()),
            },
            device_info: DeviceInfo {
                state: PrinterState::Idle,
                page_count: Some(18234),
                ..DeviceInfo::default()
            },
            cover: CoverState::Closed,
            supplies: vec![black_toner(80)],
            trays: vec![TrayReading {
                index: 2,
                description: "Tray 2".to_string(),
                status: Some("available".to_string()),
                media_name: Some("A4".to_string()),
                max_capacity: Some(250),
                current_level: Some(100),
            }],
            display_text: Some("Ready".to_string()),
            errors: None,
            failures: HashMap::new(),
            delay: Duration::ZERO,
        };
        Self {
            script: Arc::new(Mutex::new(script)),
            cycles: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn edit(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.script.lock().expect("script lock"));
    }

    pub fn set_supplies(&self, supplies: Vec<Supply>) {
        self.edit(|s| s.supplies = supplies);
    }

    pub fn set_errors(&self, errors: Option<String>) {
        self.edit(|s| s.errors = errors);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.edit(|s| s.delay = delay);
    }

    pub fn fail(&self, query: Query, error: ClientError) {
        self.edit(|s| {
            s.failures.insert(query, error);
        });
    }

    pub fn recover(&self) {
        self.edit(|s| s.failures.clear());
    }

    /// Number of cycles that reached the device (counted on the system-info query).
    pub fn cycles(&self) -> usize {
        self.cycles.load(Ordering::SeqCst)
    }

    async fn reply<T>(&self, query: Query, pick: impl FnOnce(&Script) -> T) -> Result<T, ClientError> {
        if query == Query::SystemInfo {
            self.cycles.fetch_add(1, Ordering::SeqCst);
        }
        let delay = self.script.lock().expect("script lock").delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let script = self.script.lock().expect("script lock");
        match script.failures.get(&query) {
            Some(err) => Err(err.clone()),
            None => Ok(pick(&script)),
        }
    }
}

#[async_trait]
impl PrinterClient for ScriptedClient {
    async fn system_info(&self) -> Result<SystemInfo, ClientError> {
        self.reply(Query::SystemInfo, |s| s.system_info.clone()).await
    }

    async fn device_info(&self) -> Result<DeviceInfo, ClientError> {
        self.reply(Query::DeviceInfo, |s| s.device_info.clone()).await
    }

    async fn cover_status(&self) -> Result<CoverState, ClientError> {
        self.reply(Query::CoverStatus, |s| s.cover).await
    }

    async fn supplies(&self) -> Result<Vec<Supply>, ClientError> {
        self.reply(Query::Supplies, |s| s.supplies.clone()).await
    }

    async fn input_trays(&self) -> Result<Vec<TrayReading>, ClientError> {
        self.reply(Query::InputTrays, |s| s.trays.clone()).await
    }

    async fn display_text(&self) -> Result<Option<String>, ClientError> {
        self.reply(Query::DisplayText, |s| s.display_text.clone()).await
    }

    async fn printer_errors(&self) -> Result<Option<String>, ClientError> {
        self.reply(Query::PrinterErrors, |s| s.errors.clone()).await
    }
}

/// Store kept in memory; `fail_writes` simulates a read-only disk and
/// `hang` a store that never answers.
#[derive(Clone, Default)]
pub struct MemoryStore {
    record: Arc<Mutex<Option<CacheRecord>>>,
    fail_writes: Arc<Mutex<bool>>,
    hang: Arc<Mutex<bool>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn with_record(record: CacheRecord) -> Self {
        let store = Self::default();
        *store.record.lock().expect("record lock") = Some(record);
        store
    }

    pub fn record(&self) -> Option<CacheRecord> {
        self.record.lock().expect("record lock").clone()
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.lock().expect("flag lock") = true;
    }

    pub fn hang(&self) {
        *self.hang.lock().expect("flag lock") = true;
    }

    async fn stall_if_hung(&self) {
        let hung = *self.hang.lock().expect("flag lock");
        if hung {
            std::future::pending::<()>().await;
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn read(&self) -> Result<Option<CacheRecord>, PersistenceError> {
        self.stall_if_hung().await;
        Ok(self.record())
    }

    async fn write(&self, record: &CacheRecord) -> Result<(), PersistenceError> {
        self.stall_if_hung().await;
        if *self.fail_writes.lock().expect("flag lock") {
            return Err(PersistenceError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only file system",
            )));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.record.lock().expect("record lock") = Some(record.clone());
        Ok(())
    }
}
