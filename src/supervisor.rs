// src/supervisor.rs

//! The supervisor façade: maps service id -> at most one running instance
//! and exposes the whole command/query/event surface.
//!
//! One `Supervisor` per process, created explicitly and shared by reference
//! (tests construct fresh ones; there is no global). The per-id *slot* is
//! the only point of mutual exclusion between concurrent start/stop/restart
//! calls; commands for unrelated ids never contend, and output reading never
//! takes a slot lock at all.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{ServiceConfig, SupervisorOptions};
use crate::errors::{ProcwatchError, Result};
use crate::logs::{LogHub, LogSubscription};
use crate::proc::lifecycle::{spawn_instance, stop_instance, Instance};
use crate::proc::types::{LogEntry, ServiceStatus, ServiceSummary, StatusEvent};
use crate::registry::ServiceRegistry;

/// Capacity of the global status-change broadcast feed. A subscriber that
/// lags this far behind skips ahead rather than stalling emitters.
const STATUS_FEED_CAPACITY: usize = 256;

pub struct Supervisor {
    registry: ServiceRegistry,
    options: SupervisorOptions,
    slots: Mutex<HashMap<String, Arc<ServiceSlot>>>,
    events: broadcast::Sender<StatusEvent>,
}

/// Per-service state that outlives individual instances.
///
/// The hub persists across instances so a log subscription taken out before
/// the first `start` (or kept across a restart) stays attached; each fresh
/// instance clears the ring but not the subscriber set.
struct ServiceSlot {
    hub: Arc<LogHub>,
    /// The at-most-one instance for this id. Guards the
    /// check-then-spawn-then-install sequence in `start`, which is entirely
    /// synchronous, so the lock is only ever held briefly.
    current: Mutex<Option<Arc<Instance>>>,
}

impl Supervisor {
    pub fn new(registry: ServiceRegistry, options: SupervisorOptions) -> Self {
        let (events, _) = broadcast::channel(STATUS_FEED_CAPACITY);
        Self {
            registry,
            options,
            slots: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn with_defaults(registry: ServiceRegistry) -> Self {
        Self::new(registry, SupervisorOptions::default())
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    fn slot(&self, id: &str) -> Arc<ServiceSlot> {
        let mut slots = self.slots.lock().expect("slot table lock poisoned");
        Arc::clone(slots.entry(id.to_string()).or_insert_with(|| {
            Arc::new(ServiceSlot {
                hub: LogHub::new(self.options.log_buffer_capacity),
                current: Mutex::new(None),
            })
        }))
    }

    fn lookup(&self, id: &str) -> Result<ServiceConfig> {
        self.registry
            .lookup(id)
            .ok_or_else(|| ProcwatchError::NotFound(id.to_string()))
    }

    fn summarize(&self, config: ServiceConfig) -> ServiceSummary {
        let instance = {
            let slots = self.slots.lock().expect("slot table lock poisoned");
            slots
                .get(&config.id)
                .and_then(|slot| slot.current.lock().expect("slot lock poisoned").clone())
        };

        match instance {
            Some(instance) => {
                let (status, pid, started_at, last_error) = instance.snapshot();
                ServiceSummary {
                    config,
                    status,
                    pid,
                    started_at: Some(started_at),
                    last_error,
                }
            }
            None => ServiceSummary::stopped(config),
        }
    }

    // ---- query surface -------------------------------------------------

    /// All known services with their live state, in config order.
    pub fn list_all(&self) -> Vec<ServiceSummary> {
        self.registry
            .list()
            .into_iter()
            .map(|config| self.summarize(config))
            .collect()
    }

    pub fn get(&self, id: &str) -> Result<ServiceSummary> {
        Ok(self.summarize(self.lookup(id)?))
    }

    /// Current log buffer snapshot for a service (empty if it never ran).
    pub fn logs(&self, id: &str) -> Result<Vec<Arc<LogEntry>>> {
        self.lookup(id)?;
        let slots = self.slots.lock().expect("slot table lock poisoned");
        Ok(slots.get(id).map(|slot| slot.hub.snapshot()).unwrap_or_default())
    }

    // ---- event surface -------------------------------------------------

    /// Subscribe to this service's log stream: buffer snapshot first, then
    /// live entries. Works before the first `start`; the subscription is
    /// simply quiet until an instance produces output.
    pub fn subscribe_logs(&self, id: &str) -> Result<LogSubscription> {
        self.lookup(id)?;
        Ok(self.slot(id).hub.subscribe())
    }

    /// Subscribe to the global status-change feed (all services; filter by
    /// id downstream). Events per service arrive in state-machine order.
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    // ---- command surface -----------------------------------------------

    /// Start a service. Returns as soon as the spawn is accepted by the OS,
    /// with the instance in `Starting`; observe `Running` via the status
    /// feed or polling.
    pub async fn start(&self, id: &str) -> Result<ServiceSummary> {
        let config = self.lookup(id)?;
        let slot = self.slot(id);

        {
            let mut current = slot.current.lock().expect("slot lock poisoned");
            if let Some(existing) = current.as_ref() {
                match existing.status() {
                    s if s.is_active() => {
                        return Err(ProcwatchError::AlreadyActive(id.to_string()));
                    }
                    ServiceStatus::Stopping => {
                        return Err(ProcwatchError::AlreadyStopping(id.to_string()));
                    }
                    _ => {} // terminal: replace with a fresh instance
                }
            }

            let instance = spawn_instance(&config, Arc::clone(&slot.hub), self.events.clone())?;
            *current = Some(instance);
        }

        info!(service = %id, "service start accepted");
        Ok(self.summarize(config))
    }

    /// Stop a service's running instance, escalating to a forceful kill of
    /// the whole process tree if the grace period elapses. Blocks until the
    /// instance is terminal (bounded by grace + kill confirmation).
    pub async fn stop(&self, id: &str) -> Result<ServiceSummary> {
        let config = self.lookup(id)?;

        let instance = {
            let slots = self.slots.lock().expect("slot table lock poisoned");
            slots
                .get(id)
                .and_then(|slot| slot.current.lock().expect("slot lock poisoned").clone())
        }
        .ok_or_else(|| ProcwatchError::NotRunning(id.to_string()))?;

        stop_instance(&instance, self.options.grace_period, self.options.kill_confirm).await?;
        Ok(self.summarize(config))
    }

    /// Sequential stop-then-start. The old instance fully reaches a
    /// terminal state (including escalation) before the settle delay and the
    /// new spawn; not atomic with respect to other callers.
    pub async fn restart(&self, id: &str) -> Result<ServiceSummary> {
        self.lookup(id)?;

        let instance = {
            let slots = self.slots.lock().expect("slot table lock poisoned");
            slots
                .get(id)
                .and_then(|slot| slot.current.lock().expect("slot lock poisoned").clone())
        };

        if let Some(instance) = instance
            && !instance.status().is_terminal()
        {
            match stop_instance(&instance, self.options.grace_period, self.options.kill_confirm)
                .await
            {
                Ok(()) => {}
                // Someone else's stop is in flight; wait for it to land.
                Err(ProcwatchError::AlreadyStopping(_)) => {
                    let bound = self.options.grace_period + self.options.kill_confirm;
                    if !instance.wait_terminal(bound).await {
                        return Err(ProcwatchError::TerminationFailure {
                            service: id.to_string(),
                            reason: "previous instance did not reach a terminal state"
                                .to_string(),
                        });
                    }
                }
                // Raced with the process exiting on its own.
                Err(ProcwatchError::NotRunning(_)) => {}
                Err(e) => return Err(e),
            }

            // Give the OS a moment to release listening ports etc. before
            // the replacement tries to bind them.
            tokio::time::sleep(self.options.settle_delay).await;
        }

        self.start(id).await
    }

    /// Stop every non-terminal instance concurrently and wait for all of
    /// them to reach a terminal state. Used at process-wide teardown.
    pub async fn shutdown_all(&self) -> Result<()> {
        let active: Vec<(String, Arc<Instance>)> = {
            let slots = self.slots.lock().expect("slot table lock poisoned");
            slots
                .iter()
                .filter_map(|(id, slot)| {
                    let current = slot.current.lock().expect("slot lock poisoned");
                    current
                        .as_ref()
                        .filter(|i| !i.status().is_terminal())
                        .map(|i| (id.clone(), Arc::clone(i)))
                })
                .collect()
        };

        if active.is_empty() {
            debug!("shutdown_all: nothing running");
            return Ok(());
        }

        info!(count = active.len(), "shutting down all running services");

        let grace = self.options.grace_period;
        let confirm = self.options.kill_confirm;
        let mut set = JoinSet::new();
        for (id, instance) in active {
            set.spawn(async move {
                let res = match stop_instance(&instance, grace, confirm).await {
                    // A concurrent stop beat us to it; still wait until the
                    // instance is actually terminal.
                    Err(ProcwatchError::AlreadyStopping(_)) => {
                        if instance.wait_terminal(grace + confirm).await {
                            Ok(())
                        } else {
                            Err(ProcwatchError::TerminationFailure {
                                service: instance.service_id.clone(),
                                reason: "instance did not reach a terminal state".to_string(),
                            })
                        }
                    }
                    // Exited on its own in the meantime.
                    Err(ProcwatchError::NotRunning(_)) => Ok(()),
                    other => other,
                };
                (id, res)
            });
        }

        let mut first_failure: Option<ProcwatchError> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, Ok(()))) => debug!(service = %id, "service shut down"),
                Ok((id, Err(e))) => {
                    warn!(service = %id, error = %e, "failed to shut down service");
                    first_failure.get_or_insert(e);
                }
                Err(join_err) => {
                    warn!(error = %join_err, "shutdown task panicked");
                    first_failure.get_or_insert(ProcwatchError::Other(join_err.into()));
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
