pub mod assembler;
pub mod cache;
pub mod classify;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod entities;
pub mod error;
pub mod registry;
pub mod snapshot;
pub mod web;

#[cfg(test)]
mod testing;

pub use assembler::Assembler;
pub use cache::{CacheRecord, CacheStore, JsonFileStore, SnapshotStore};
pub use classify::{classify, Classification};
pub use client::{ClientError, PrinterClient, Query, ReplayClient};
pub use config::{CoordinatorConfig, Credentials, DeviceConfig, FleetConfig};
pub use coordinator::{Coordinator, CoordinatorState, CoordinatorStatus, RefreshHandle, RefreshOutcome};
pub use entities::{entities, DeviceIdentity, Entity};
pub use error::{CollectionError, PersistenceError, RefreshError, RegistryError};
pub use registry::Registry;
pub use snapshot::{PrinterData, Snapshot};
pub use web::WebInterfaceProbe;
