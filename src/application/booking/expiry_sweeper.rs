//! Background reclamation of abandoned reservations
//!
//! Two periodic jobs share one shape: read candidates, then expire each
//! row in its own transaction. The transition re-checks the row under its
//! lock, so rows a webhook settled in the meantime are skipped, and one
//! row failing never aborts the rest of the batch.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::notifications::NotificationQueue;
use crate::domain::events::{Event, ReservationExpiredEvent};
use crate::domain::reservation::{Reservation, ReservationChange};
use crate::domain::{DomainResult, RepositoryProvider};
use crate::shared::shutdown::ShutdownSignal;

/// Counts from one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub expired: usize,
    /// Changed state before the sweep reached them
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweep {
    StalePending,
    PaymentTimeout,
}

impl Sweep {
    fn label(self) -> &'static str {
        match self {
            Sweep::StalePending => "stale_pending",
            Sweep::PaymentTimeout => "payment_timeout",
        }
    }
}

pub struct ExpirySweeper {
    repos: Arc<dyn RepositoryProvider>,
    queue: NotificationQueue,
    pending_grace: Duration,
}

impl ExpirySweeper {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        queue: NotificationQueue,
        pending_grace: Duration,
    ) -> Self {
        Self {
            repos,
            queue,
            pending_grace,
        }
    }

    /// Expire PENDING reservations older than the grace window.
    pub async fn sweep_stale_pending(&self, now: DateTime<Utc>) -> DomainResult<SweepReport> {
        let candidates = self
            .repos
            .reservations()
            .find_stale_pending(now - self.pending_grace)
            .await?;
        let change = ReservationChange::ExpireStalePending {
            grace: self.pending_grace,
        };
        Ok(self.expire_all(Sweep::StalePending, candidates, change, now).await)
    }

    /// Expire AWAITING_CONFIRMATION reservations whose payment lock passed.
    pub async fn sweep_payment_timeouts(&self, now: DateTime<Utc>) -> DomainResult<SweepReport> {
        let candidates = self
            .repos
            .reservations()
            .find_payment_timed_out(now)
            .await?;
        Ok(self
            .expire_all(
                Sweep::PaymentTimeout,
                candidates,
                ReservationChange::ExpirePaymentTimeout,
                now,
            )
            .await)
    }

    async fn expire_all(
        &self,
        sweep: Sweep,
        candidates: Vec<Reservation>,
        change: ReservationChange,
        now: DateTime<Utc>,
    ) -> SweepReport {
        let mut report = SweepReport {
            candidates: candidates.len(),
            ..SweepReport::default()
        };
        if candidates.is_empty() {
            return report;
        }

        for candidate in candidates {
            match self
                .repos
                .reservations()
                .apply_change(&candidate.id, change, now)
                .await
            {
                Ok((stored, transition)) if transition.applied() => {
                    report.expired += 1;
                    debug!(
                        reservation_id = %stored.id,
                        from = %candidate.status,
                        to = %stored.status,
                        payment_status = %stored.payment_status,
                        sweep = sweep.label(),
                        "Reservation expired"
                    );
                    self.queue
                        .enqueue(Event::ReservationExpired(ReservationExpiredEvent {
                            reservation_id: stored.id,
                            reason: sweep.label().into(),
                            timestamp: now,
                        }));
                }
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        reservation_id = %candidate.id,
                        sweep = sweep.label(),
                        error = %e,
                        "Failed to expire reservation"
                    );
                }
            }
        }

        if report.expired > 0 {
            metrics::counter!("booking_reservations_expired_total", "sweep" => sweep.label())
                .increment(report.expired as u64);
        }
        info!(
            sweep = sweep.label(),
            candidates = report.candidates,
            expired = report.expired,
            skipped = report.skipped,
            failed = report.failed,
            "Expiry sweep finished"
        );
        report
    }

    /// Spawn both sweeps on their own `interval` timers.
    pub fn start(
        self: Arc<Self>,
        interval: std::time::Duration,
        shutdown: ShutdownSignal,
    ) -> Vec<JoinHandle<()>> {
        vec![
            spawn_sweep(self.clone(), Sweep::StalePending, interval, shutdown.clone()),
            spawn_sweep(self, Sweep::PaymentTimeout, interval, shutdown),
        ]
    }
}

fn spawn_sweep(
    sweeper: Arc<ExpirySweeper>,
    sweep: Sweep,
    interval: std::time::Duration,
    shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            sweep = sweep.label(),
            interval_secs = interval.as_secs(),
            "🧹 Expiry sweep started"
        );

        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    let result = match sweep {
                        Sweep::StalePending => sweeper.sweep_stale_pending(now).await,
                        Sweep::PaymentTimeout => sweeper.sweep_payment_timeouts(now).await,
                    };
                    if let Err(e) = result {
                        warn!(sweep = sweep.label(), error = %e, "Expiry sweep error");
                    }
                }
                _ = shutdown.notified().wait() => {
                    info!(sweep = sweep.label(), "🧹 Expiry sweep shutting down");
                    break;
                }
            }
        }

        info!(sweep = sweep.label(), "🧹 Expiry sweep stopped");
    })
}
