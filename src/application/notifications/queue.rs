//! Hand-off queue between the booking core and notification delivery
//!
//! Enqueueing never blocks and never fails the caller: a closed queue is
//! logged and the event dropped.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::events::{Event, EventMessage};

/// Producer side, cloned into every use case that emits events.
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::UnboundedSender<EventMessage>,
}

/// Consumer side, owned by the notification worker.
pub struct NotificationReceiver {
    receiver: mpsc::UnboundedReceiver<EventMessage>,
}

/// Create a connected queue / receiver pair
pub fn notification_channel() -> (NotificationQueue, NotificationReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        NotificationQueue { sender },
        NotificationReceiver { receiver },
    )
}

impl NotificationQueue {
    pub fn enqueue(&self, event: Event) {
        let message = EventMessage::new(event);
        let event_type = message.event.event_type();
        let reservation_id = message.event.reservation_id().to_string();

        match self.sender.send(message) {
            Ok(()) => debug!(event_type, %reservation_id, "Event enqueued"),
            Err(_) => warn!(
                event_type,
                %reservation_id,
                "Notification queue closed, event dropped"
            ),
        }
    }
}

impl NotificationReceiver {
    pub async fn recv(&mut self) -> Option<EventMessage> {
        self.receiver.recv().await
    }

    /// Next message if one is ready
    pub fn try_recv(&mut self) -> Option<EventMessage> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::ReservationCancelledEvent;
    use chrono::Utc;

    fn cancelled(id: &str) -> Event {
        Event::ReservationCancelled(ReservationCancelledEvent {
            reservation_id: id.into(),
            reason: "owner_cancelled".into(),
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_enqueue_then_receive_in_order() {
        let (queue, mut rx) = notification_channel();
        queue.enqueue(cancelled("r1"));
        queue.clone().enqueue(cancelled("r2"));

        assert_eq!(rx.recv().await.unwrap().event.reservation_id(), "r1");
        assert_eq!(rx.try_recv().unwrap().event.reservation_id(), "r2");
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_enqueue_after_receiver_dropped_does_not_panic() {
        let (queue, rx) = notification_channel();
        drop(rx);
        queue.enqueue(cancelled("r1"));
    }
}
