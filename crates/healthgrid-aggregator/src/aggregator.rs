//! Health aggregator — the task that owns the registry.
//!
//! Every mutation and query goes through a bounded mailbox and is handled
//! to completion, one message at a time, in the order it was enqueued.
//! Transitions are forwarded to the [`EventNotifier`] from inside the task.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use healthgrid_core::{
    AggregatorConfig, ApplicationKey, GlobalHealth, HealthCheck, HealthEvent, HealthResult,
    InstanceHealthChanged, InstanceKey,
};

use crate::error::{AggregatorError, AggregatorResult};
use crate::notifier::EventNotifier;
use crate::registry::{CheckStatuses, Registry, RegistryStats};

/// A message in the aggregator's mailbox.
#[derive(Debug)]
pub enum AggregatorMessage {
    Event(HealthEvent),
    InstanceHealth {
        instance: InstanceKey,
        reply: oneshot::Sender<Option<GlobalHealth>>,
    },
    InstanceStatuses {
        instance: InstanceKey,
        reply: oneshot::Sender<Option<CheckStatuses>>,
    },
    Stats {
        reply: oneshot::Sender<RegistryStats>,
    },
}

impl From<HealthEvent> for AggregatorMessage {
    fn from(event: HealthEvent) -> Self {
        Self::Event(event)
    }
}

/// Owns the [`Registry`] and processes mailbox messages sequentially.
pub struct HealthAggregator {
    registry: Registry,
    notifier: Arc<dyn EventNotifier>,
    mailbox: mpsc::Receiver<AggregatorMessage>,
}

impl HealthAggregator {
    /// Create an aggregator and the handle used to feed it.
    pub fn new(
        config: &AggregatorConfig,
        notifier: Arc<dyn EventNotifier>,
    ) -> (Self, AggregatorHandle) {
        let (sender, mailbox) = mpsc::channel(config.mailbox_capacity.max(1));
        let aggregator = Self {
            registry: Registry::new(config.removal_purge),
            notifier,
            mailbox,
        };
        (aggregator, AggregatorHandle { sender })
    }

    /// Spawn the aggregator on the current runtime.
    ///
    /// The task stops when `shutdown` fires or every handle is dropped, and
    /// yields the final registry.
    pub fn spawn(
        config: &AggregatorConfig,
        notifier: Arc<dyn EventNotifier>,
        shutdown: watch::Receiver<bool>,
    ) -> (AggregatorHandle, JoinHandle<Registry>) {
        let (aggregator, handle) = Self::new(config, notifier);
        let task = tokio::spawn(aggregator.run_until(shutdown));
        (handle, task)
    }

    /// Drain the mailbox until every handle is dropped.
    pub async fn run(mut self) -> Registry {
        info!("health aggregator started");
        while let Some(message) = self.mailbox.recv().await {
            self.handle(message);
        }
        info!("health aggregator stopped: all handles dropped");
        self.registry
    }

    /// Drain the mailbox until `shutdown` fires or every handle is dropped.
    pub async fn run_until(mut self, mut shutdown: watch::Receiver<bool>) -> Registry {
        info!("health aggregator started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("health aggregator shutting down");
                    break;
                }
                message = self.mailbox.recv() => match message {
                    Some(message) => self.handle(message),
                    None => {
                        info!("health aggregator stopped: all handles dropped");
                        break;
                    }
                },
            }
        }
        self.registry
    }

    /// Handle one message to completion.
    pub fn handle(&mut self, message: AggregatorMessage) {
        match message {
            AggregatorMessage::Event(event) => self.apply(event),
            AggregatorMessage::InstanceHealth { instance, reply } => {
                let _ = reply.send(self.registry.instance_health(&instance));
            }
            AggregatorMessage::InstanceStatuses { instance, reply } => {
                let _ = reply.send(self.registry.instance_statuses(&instance).cloned());
            }
            AggregatorMessage::Stats { reply } => {
                let _ = reply.send(self.registry.stats());
            }
        }
    }

    /// Apply one inbound health event to the registry.
    pub fn apply(&mut self, event: HealthEvent) {
        debug!(kind = event.kind(), "handling health event");
        match event {
            HealthEvent::AddHealthCheck { app, check } => {
                self.registry.add_health_check(&app, check);
            }
            HealthEvent::RemoveHealthCheck { app, check } => {
                self.registry.remove_health_check(&app, &check);
            }
            HealthEvent::PurgeHealthCheckStatuses { statuses } => {
                self.registry.purge_health_check_statuses(&statuses);
            }
            HealthEvent::HealthCheckStatusChanged { app, check, result } => {
                let notifier = &self.notifier;
                let instance_id = result.instance_id.clone();
                self.registry
                    .update_health_check_status(&app, &check, result, |health| {
                        notifier.instance_health_changed(InstanceHealthChanged::new(
                            &app,
                            &instance_id,
                            health,
                        ));
                    });
            }
        }
    }

    /// Read access to the registry, for callers driving [`Self::handle`]
    /// directly instead of running the task.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Cloneable sender side of an aggregator's mailbox.
#[derive(Debug, Clone)]
pub struct AggregatorHandle {
    sender: mpsc::Sender<AggregatorMessage>,
}

impl AggregatorHandle {
    /// Enqueue an inbound event.
    pub async fn send(&self, event: HealthEvent) -> AggregatorResult<()> {
        self.sender
            .send(event.into())
            .await
            .map_err(|_| AggregatorError::Closed)
    }

    pub async fn add_health_check(
        &self,
        app: ApplicationKey,
        check: HealthCheck,
    ) -> AggregatorResult<()> {
        self.send(HealthEvent::AddHealthCheck { app, check }).await
    }

    pub async fn remove_health_check(
        &self,
        app: ApplicationKey,
        check: HealthCheck,
    ) -> AggregatorResult<()> {
        self.send(HealthEvent::RemoveHealthCheck { app, check }).await
    }

    pub async fn purge_health_check_statuses(
        &self,
        statuses: Vec<(InstanceKey, HealthCheck)>,
    ) -> AggregatorResult<()> {
        self.send(HealthEvent::PurgeHealthCheckStatuses { statuses })
            .await
    }

    pub async fn health_check_status_changed(
        &self,
        app: ApplicationKey,
        check: HealthCheck,
        result: HealthResult,
    ) -> AggregatorResult<()> {
        self.send(HealthEvent::HealthCheckStatusChanged { app, check, result })
            .await
    }

    /// Current global health of `instance`, `None` if it is not tracked.
    pub async fn instance_health(
        &self,
        instance: InstanceKey,
    ) -> AggregatorResult<Option<GlobalHealth>> {
        self.query("instance_health", |reply| AggregatorMessage::InstanceHealth {
            instance,
            reply,
        })
        .await
    }

    /// Snapshot of the per-check results held for `instance`.
    pub async fn instance_statuses(
        &self,
        instance: InstanceKey,
    ) -> AggregatorResult<Option<CheckStatuses>> {
        self.query("instance_statuses", |reply| {
            AggregatorMessage::InstanceStatuses { instance, reply }
        })
        .await
    }

    pub async fn stats(&self) -> AggregatorResult<RegistryStats> {
        self.query("stats", |reply| AggregatorMessage::Stats { reply })
            .await
    }

    async fn query<T>(
        &self,
        name: &'static str,
        message: impl FnOnce(oneshot::Sender<T>) -> AggregatorMessage,
    ) -> AggregatorResult<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(message(reply))
            .await
            .map_err(|_| AggregatorError::Closed)?;
        response.await.map_err(|_| AggregatorError::NoReply(name))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
