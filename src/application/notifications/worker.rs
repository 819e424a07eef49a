//! Background delivery of queued booking events
//!
//! Delivery is at-least-once from the queue's point of view; the worker
//! makes it effectively once per `(event type, reservation)` by recording
//! what it has delivered and skipping repeats. Only the most recent
//! deliveries are remembered, bounded by `DEFAULT_DEDUP_CAPACITY`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashSet;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::queue::NotificationReceiver;
use crate::application::ports::{Notifier, NotifyError};
use crate::domain::events::EventMessage;
use crate::shared::retry::{retry_with_backoff, RetryConfig};
use crate::shared::shutdown::ShutdownSignal;

/// Default notifier: writes the event to the log.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, message: &EventMessage) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(&message.event)
            .map_err(|e| NotifyError::Rejected(e.to_string()))?;
        info!(
            event_type = message.event.event_type(),
            reservation_id = message.event.reservation_id(),
            %payload,
            "📨 Notification"
        );
        Ok(())
    }
}

/// Delivered keys remembered for duplicate suppression
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Set of delivered keys that forgets the oldest entry once full.
struct DeliveredKeys {
    keys: DashSet<String>,
    order: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl DeliveredKeys {
    fn new(capacity: usize) -> Self {
        Self {
            keys: DashSet::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn insert(&self, key: String) {
        if !self.keys.insert(key.clone()) {
            return;
        }
        let mut order = match self.order.lock() {
            Ok(order) => order,
            Err(poisoned) => poisoned.into_inner(),
        };
        order.push_back(key);
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

pub struct NotificationWorker {
    receiver: NotificationReceiver,
    delivery: Delivery,
}

struct Delivery {
    notifier: Arc<dyn Notifier>,
    delivered: DeliveredKeys,
    retry: RetryConfig,
}

impl Delivery {
    fn dedup_key(message: &EventMessage) -> String {
        format!(
            "{}:{}",
            message.event.event_type(),
            message.event.reservation_id()
        )
    }

    async fn process(&self, message: &EventMessage) -> bool {
        let key = Self::dedup_key(message);
        if self.delivered.contains(&key) {
            info!(%key, "Notification already delivered, skipping");
            return false;
        }

        let notifier = &self.notifier;
        let result = retry_with_backoff(
            self.retry.clone(),
            || notifier.notify(message),
            NotifyError::is_transient,
            "notify",
        )
        .await;

        match result {
            Ok(()) => {
                self.delivered.insert(key);
                true
            }
            Err(e) => {
                error!(%key, error = %e, "Notification delivery failed");
                false
            }
        }
    }

    async fn drain(&self, receiver: &mut NotificationReceiver) -> usize {
        let mut delivered = 0;
        while let Some(message) = receiver.try_recv() {
            if self.process(&message).await {
                delivered += 1;
            }
        }
        delivered
    }
}

impl NotificationWorker {
    pub fn new(receiver: NotificationReceiver, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            receiver,
            delivery: Delivery {
                notifier,
                delivered: DeliveredKeys::new(DEFAULT_DEDUP_CAPACITY),
                retry: RetryConfig::default(),
            },
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.delivery.retry = retry;
        self
    }

    /// Remember at most `capacity` delivered keys.
    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.delivery.delivered = DeliveredKeys::new(capacity);
        self
    }

    /// Number of delivered keys currently remembered
    pub fn remembered(&self) -> usize {
        self.delivery.delivered.len()
    }

    /// Deliver one message. Returns `true` if the notifier was called
    /// successfully, `false` for a skipped duplicate or a failed delivery.
    pub async fn process(&self, message: &EventMessage) -> bool {
        self.delivery.process(message).await
    }

    /// Process everything currently queued, without waiting.
    pub async fn drain(&mut self) -> usize {
        self.delivery.drain(&mut self.receiver).await
    }

    /// Run until shutdown; queued messages are drained before exiting.
    pub fn start(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let NotificationWorker {
            mut receiver,
            delivery,
        } = self;

        tokio::spawn(async move {
            info!("📨 Notification worker started");
            loop {
                tokio::select! {
                    message = receiver.recv() => {
                        match message {
                            Some(message) => {
                                delivery.process(&message).await;
                            }
                            None => break,
                        }
                    }
                    _ = shutdown.notified().wait() => {
                        info!("📨 Notification worker shutting down");
                        break;
                    }
                }
            }
            let drained = delivery.drain(&mut receiver).await;
            info!(drained, "📨 Notification worker stopped");
        })
    }
}
