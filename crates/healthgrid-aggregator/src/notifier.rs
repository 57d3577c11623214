//! Event notifier — where instance health transitions are published.
//!
//! The aggregator calls the notifier synchronously from its task, so
//! implementations must not block.

use tokio::sync::broadcast;
use tracing::{debug, info};

use healthgrid_core::InstanceHealthChanged;

/// Receives instance health transitions from the aggregator.
pub trait EventNotifier: Send + Sync {
    fn instance_health_changed(&self, event: InstanceHealthChanged);
}

impl<F> EventNotifier for F
where
    F: Fn(InstanceHealthChanged) + Send + Sync,
{
    fn instance_health_changed(&self, event: InstanceHealthChanged) {
        self(event)
    }
}

/// Publishes transitions on a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<InstanceHealthChanged>,
}

impl BroadcastNotifier {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InstanceHealthChanged> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventNotifier for BroadcastNotifier {
    fn instance_health_changed(&self, event: InstanceHealthChanged) {
        // No subscribers is fine; the event is simply dropped.
        if self.sender.send(event).is_err() {
            debug!("no subscribers for instance health event");
        }
    }
}

/// Logs every transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl EventNotifier for LogNotifier {
    fn instance_health_changed(&self, event: InstanceHealthChanged) {
        info!(
            app_id = %event.app_id,
            version = %event.version,
            instance_id = %event.instance_id,
            healthiness = %event.healthiness,
            "instance health changed"
        );
    }
}
