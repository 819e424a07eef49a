pub mod booking;
pub mod notifications;
pub mod ports;

// Re-export key types for convenience
pub use booking::{
    AvailabilityChecker, BookingPolicy, BookingService, CreateReservation, ExpirySweeper,
    OrderCoordinator, OrderOutcome, SlotAvailability, SlotView, SweepReport, WebhookOutcome,
    WebhookProcessor,
};
pub use notifications::{
    notification_channel, LoggingNotifier, NotificationQueue, NotificationWorker,
};
pub use ports::{Notifier, PaymentProvider};
