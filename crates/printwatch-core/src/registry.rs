use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::info;

use crate::cache::SnapshotStore;
use crate::client::PrinterClient;
use crate::coordinator::{Coordinator, RefreshHandle};
use crate::error::RegistryError;

struct Registered<C: PrinterClient, S: SnapshotStore> {
    coordinator: Coordinator<C, S>,
    handle: RefreshHandle,
}

/// Process-wide set of monitored devices, keyed by device identity. Each
/// entry owns its coordinator and periodic task from registration to removal.
pub struct Registry<C: PrinterClient, S: SnapshotStore> {
    devices: Mutex<HashMap<String, Registered<C, S>>>,
}

impl<C, S> Default for Registry<C, S>
where
    C: PrinterClient + 'static,
    S: SnapshotStore + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C, S> Registry<C, S>
where
    C: PrinterClient + 'static,
    S: SnapshotStore + 'static,
{
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Awaits the coordinator's first cycle, then starts its periodic task.
    /// A failed first cycle still registers the device; the outcome is on
    /// [`Coordinator::status`].
    pub async fn add_device(&self, coordinator: Coordinator<C, S>) -> Result<Coordinator<C, S>, RegistryError> {
        let identity = coordinator.identity().to_string();
        if self.devices.lock().await.contains_key(&identity) {
            return Err(RegistryError::Duplicate(identity));
        }

        // The first cycle can take a full query timeout; don't hold the map for it.
        let first = coordinator.initial_refresh().await;
        let handle = coordinator.spawn();

        let mut devices = self.devices.lock().await;
        if devices.contains_key(&identity) {
            drop(devices);
            handle.shutdown().await;
            return Err(RegistryError::Duplicate(identity));
        }
        devices.insert(
            identity.clone(),
            Registered {
                coordinator: coordinator.clone(),
                handle,
            },
        );
        info!(
            device = %identity,
            state = ?coordinator.state(),
            first_refresh_ok = first.is_ok(),
            "device registered"
        );
        Ok(coordinator)
    }

    pub async fn remove_device(&self, identity: &str) -> Result<(), RegistryError> {
        let removed = self.devices.lock().await.remove(identity);
        match removed {
            Some(entry) => {
                entry.handle.shutdown().await;
                info!(device = %identity, "device removed");
                Ok(())
            }
            None => Err(RegistryError::Unknown(identity.to_string())),
        }
    }

    pub async fn get(&self, identity: &str) -> Option<Coordinator<C, S>> {
        self.devices
            .lock()
            .await
            .get(identity)
            .map(|entry| entry.coordinator.clone())
    }

    pub async fn identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn shutdown(&self) {
        let drained: Vec<(String, Registered<C, S>)> = self.devices.lock().await.drain().collect();
        for (identity, entry) in drained {
            entry.handle.shutdown().await;
            info!(device = %identity, "device stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::assembler::Assembler;
    use crate::cache::CacheStore;
    use crate::classify::Classification;
    use crate::client::{ClientError, Query};
    use crate::config::CoordinatorConfig;
    use crate::coordinator::CoordinatorState;
    use crate::testing::{MemoryStore, ScriptedClient};

    async fn coordinator(client: &ScriptedClient, identity: &str) -> Coordinator<ScriptedClient, MemoryStore> {
        let assembler = Assembler::new(client.clone(), identity, Duration::from_millis(200));
        let cache = CacheStore::new(MemoryStore::default(), identity, Duration::from_secs(1));
        Coordinator::new(assembler, cache, CoordinatorConfig::default()).await
    }

    #[tokio::test]
    async fn add_runs_first_cycle_and_registers() {
        let registry = Registry::new();
        let client = ScriptedClient::healthy();

        let added = registry
            .add_device(coordinator(&client, "10.0.0.20:161").await)
            .await
            .expect("registered");

        assert_eq!(added.state(), CoordinatorState::Fresh);
        assert_eq!(registry.identities().await, vec!["10.0.0.20:161".to_string()]);
        assert!(registry.get("10.0.0.20:161").await.is_some());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn unreachable_device_still_completes_registration() {
        let registry = Registry::new();
        let client = ScriptedClient::healthy();
        client.fail(Query::SystemInfo, ClientError::Timeout);

        let added = registry
            .add_device(coordinator(&client, "10.0.0.21:161").await)
            .await
            .expect("registered");

        assert_eq!(added.state(), CoordinatorState::Initializing);
        assert!(added.snapshot().is_none());
        let status = added.status();
        assert!(!status.last_update_success);
        assert!(status.last_attempt.is_some());
        assert!(matches!(
            status.last_error,
            Some(ref err) if err.classification == Classification::Unreachable
        ));
        assert_eq!(client.cycles(), 1, "registration runs exactly one cycle before spawning");
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_identity_is_rejected() {
        let registry = Registry::new();
        let client = ScriptedClient::healthy();
        registry
            .add_device(coordinator(&client, "10.0.0.20:161").await)
            .await
            .expect("first");

        let result = registry
            .add_device(coordinator(&client, "10.0.0.20:161").await)
            .await;

        assert!(matches!(result, Err(RegistryError::Duplicate(id)) if id == "10.0.0.20:161"));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn remove_stops_and_forgets_the_device() {
        let registry = Registry::new();
        let client = ScriptedClient::healthy();
        registry
            .add_device(coordinator(&client, "10.0.0.20:161").await)
            .await
            .expect("registered");

        registry.remove_device("10.0.0.20:161").await.expect("removed");

        assert!(registry.get("10.0.0.20:161").await.is_none());
        assert!(matches!(
            registry.remove_device("10.0.0.20:161").await,
            Err(RegistryError::Unknown(_))
        ));
    }
}
