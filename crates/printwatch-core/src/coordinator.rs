use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::assembler::Assembler;
use crate::cache::{CacheStore, SnapshotStore};
use crate::classify::{classify, Classification};
use crate::client::PrinterClient;
use crate::config::CoordinatorConfig;
use crate::error::RefreshError;
use crate::snapshot::{PrinterData, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    /// Cache loaded, nothing published yet.
    Initializing,
    Fresh,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorStatus {
    pub state: CoordinatorState,
    pub last_update_success: bool,
    pub last_error: Option<RefreshError>,
    pub last_attempt: Option<DateTime<Utc>>,
}

pub type RefreshOutcome = Result<Arc<Snapshot>, RefreshError>;

struct LastGood {
    data: PrinterData,
    captured_at: DateTime<Utc>,
}

struct CycleSlot {
    last_good: Option<LastGood>,
    last_outcome: Option<RefreshOutcome>,
}

struct Inner<C: PrinterClient, S: SnapshotStore> {
    identity: String,
    assembler: Assembler<C>,
    cache: CacheStore<S>,
    config: CoordinatorConfig,
    // Held for the whole cycle: at most one refresh in flight per device.
    cycle: Mutex<CycleSlot>,
    completed: AtomicU64,
    published: watch::Sender<Option<Arc<Snapshot>>>,
    status: watch::Sender<CoordinatorStatus>,
}

/// Owns the refresh cycle of one device and publishes its snapshots.
pub struct Coordinator<C: PrinterClient, S: SnapshotStore> {
    inner: Arc<Inner<C, S>>,
}

impl<C: PrinterClient, S: SnapshotStore> Clone for Coordinator<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, S> Coordinator<C, S>
where
    C: PrinterClient + 'static,
    S: SnapshotStore + 'static,
{
    /// Loads the cached snapshot so fallback is available before the first
    /// cycle completes. Nothing is published until a cycle runs.
    pub async fn new(assembler: Assembler<C>, cache: CacheStore<S>, config: CoordinatorConfig) -> Self {
        let identity = cache.device_identity().to_string();
        let last_good = cache.load().await.map(|record| LastGood {
            data: record.snapshot,
            captured_at: record.timestamp,
        });

        let (published, _) = watch::channel(None);
        let (status, _) = watch::channel(CoordinatorStatus {
            state: CoordinatorState::Initializing,
            last_update_success: false,
            last_error: None,
            last_attempt: None,
        });

        Self {
            inner: Arc::new(Inner {
                identity,
                assembler,
                cache,
                config: config.normalized(),
                cycle: Mutex::new(CycleSlot {
                    last_good,
                    last_outcome: None,
                }),
                completed: AtomicU64::new(0),
                published,
                status,
            }),
        }
    }

    /// Builds the coordinator and awaits its first cycle. An unreachable
    /// device without cache returns promptly with the failure.
    pub async fn setup(
        assembler: Assembler<C>,
        cache: CacheStore<S>,
        config: CoordinatorConfig,
    ) -> (Self, RefreshOutcome) {
        let coordinator = Self::new(assembler, cache, config).await;
        let first = coordinator.initial_refresh().await;
        (coordinator, first)
    }

    /// Runs the first cycle. Failure is logged and returned; the coordinator
    /// stays usable and later cycles retry.
    pub async fn initial_refresh(&self) -> RefreshOutcome {
        let first = self.refresh().await;
        match &first {
            Ok(snapshot) => info!(
                device = %self.inner.identity,
                online = snapshot.is_online(),
                "initial refresh complete"
            ),
            Err(err) => warn!(device = %self.inner.identity, error = %err, "initial refresh failed"),
        }
        first
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.inner.published.subscribe()
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.published.borrow().clone()
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.inner.status.borrow().clone()
    }

    pub fn state(&self) -> CoordinatorState {
        self.inner.status.borrow().state
    }

    /// Runs one cycle. A caller arriving while a cycle is in flight waits for
    /// it and receives its outcome instead of starting another.
    pub async fn refresh(&self) -> RefreshOutcome {
        let seen = self.inner.completed.load(Ordering::Acquire);
        let mut slot = self.inner.cycle.lock().await;

        if self.inner.completed.load(Ordering::Acquire) != seen {
            if let Some(outcome) = &slot.last_outcome {
                debug!(device = %self.inner.identity, "joined in-flight refresh");
                return outcome.clone();
            }
        }

        let outcome = self.run_cycle(&mut slot).await;
        slot.last_outcome = Some(outcome.clone());
        self.inner.completed.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    async fn run_cycle(&self, slot: &mut CycleSlot) -> RefreshOutcome {
        let attempt = Utc::now();
        let identity = &self.inner.identity;

        let err = match self.inner.assembler.assemble().await {
            Ok(data) => {
                let captured_at = Utc::now();
                self.inner.cache.save(&data, captured_at).await;

                let snapshot = Arc::new(Snapshot::fresh(data.clone()));
                slot.last_good = Some(LastGood { data, captured_at });

                if self.state() == CoordinatorState::Stale {
                    info!(device = %identity, "printer back online");
                }
                self.publish(Arc::clone(&snapshot), CoordinatorState::Fresh, attempt);
                return Ok(snapshot);
            }
            Err(err) => err,
        };

        let classification = classify(&err);
        if classification == Classification::Unreachable {
            if let Some(last) = &slot.last_good {
                warn!(
                    device = %identity,
                    error = %err,
                    offline_since = %last.captured_at,
                    "printer offline, serving cached data"
                );
                let snapshot = Arc::new(Snapshot::stale(last.data.clone(), last.captured_at));
                self.publish(Arc::clone(&snapshot), CoordinatorState::Stale, attempt);
                return Ok(snapshot);
            }
        }

        let err = RefreshError {
            classification,
            source: err,
        };
        warn!(device = %identity, error = %err, ?classification, "refresh failed");
        self.inner.status.send_modify(|status| {
            status.last_update_success = false;
            status.last_error = Some(err.clone());
            status.last_attempt = Some(attempt);
        });
        Err(err)
    }

    fn publish(&self, snapshot: Arc<Snapshot>, state: CoordinatorState, attempt: DateTime<Utc>) {
        self.inner.published.send_replace(Some(snapshot));
        self.inner.status.send_modify(|status| {
            status.state = state;
            status.last_update_success = true;
            status.last_error = None;
            status.last_attempt = Some(attempt);
        });
    }

    /// Starts the periodic refresh task. The first tick is one interval out:
    /// setup has already run the initial cycle.
    pub fn spawn(&self) -> RefreshHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let coordinator = self.clone();
        let period = self.inner.config.update_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = stop_rx.changed() => {
                                debug!(device = %coordinator.inner.identity, "shutdown during refresh, discarding cycle");
                                break;
                            }
                            outcome = coordinator.refresh() => {
                                if let Err(err) = outcome {
                                    debug!(device = %coordinator.inner.identity, error = %err, "scheduled refresh failed");
                                }
                            }
                        }
                    }
                }
            }
            debug!(device = %coordinator.inner.identity, "refresh task stopped");
        });

        RefreshHandle { stop_tx, task }
    }
}

/// Stops a coordinator's periodic task.
pub struct RefreshHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "refresh task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
