//! Notification hand-off: queue, worker and the default notifier

pub mod queue;
pub mod worker;

pub use queue::{notification_channel, NotificationQueue, NotificationReceiver};
pub use worker::{LoggingNotifier, NotificationWorker};
