//! Expiration Reaper (SPEC_FULL.md §4.7): a single-leader sweep over
//! PENDING reservations whose TTL has lapsed. The leader lock only bounds
//! how many replicas attempt a sweep concurrently — `cancel_expired`'s
//! conditional update is what actually serializes the outcome.

use std::sync::Arc;

use chrono::Utc;
use coordination::keys::{self, REAPER_LEADER_LOCK};
use coordination::lock::LockStore;
use events::{EventPublisher, ReservationExpiredEvent, SeatReleasedEvent};
use rand::Rng;
use store::ReservationRepository;
use tracing::{error, info, instrument};

const LEADER_LOCK_TTL_MS: i64 = 4_500;

pub struct ExpirationReaper {
    repo: Arc<dyn ReservationRepository>,
    locks: Arc<dyn LockStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl ExpirationReaper {
    pub fn new(
        repo: Arc<dyn ReservationRepository>,
        locks: Arc<dyn LockStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { repo, locks, publisher }
    }

    /// One tick. Errors are logged and swallowed — this is the one place in
    /// the core that absorbs failures rather than propagating them, since
    /// the next tick will simply retry.
    #[instrument(skip(self))]
    pub async fn tick(&self) {
        if let Err(e) = self.run().await {
            error!(error = %e, "expiration reaper tick failed");
        }
    }

    async fn run(&self) -> anyhow::Result<()> {
        let token: String = {
            let mut rng = rand::thread_rng();
            (0..32).map(|_| rng.sample(rand::distributions::Alphanumeric) as char).collect()
        };

        let acquired = self.locks.acquire(REAPER_LEADER_LOCK, &token, LEADER_LOCK_TTL_MS).await?;
        if !acquired {
            return Ok(());
        }

        let outcome = self.sweep().await;

        if let Err(e) = self.locks.release(REAPER_LEADER_LOCK, &token).await {
            error!(error = %e, "failed to release reaper leader lock");
        }

        outcome
    }

    async fn sweep(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        let candidates = self.repo.list_expired_pending(now).await?;
        if candidates.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = candidates.iter().map(|r| r.id.clone()).collect();
        let transitioned = self.repo.cancel_expired(&ids, now).await?;
        if transitioned.is_empty() {
            // Another leader already handled this batch.
            return Ok(());
        }

        info!(count = transitioned.len(), "reaped expired reservations");

        // A candidate can be concurrently confirmed between `list_expired_pending`
        // and `cancel_expired`; only act on the ids that actually transitioned.
        let transitioned: std::collections::HashSet<&str> =
            transitioned.iter().map(String::as_str).collect();
        let reaped = candidates.iter().filter(|r| transitioned.contains(r.id.as_str()));

        for reservation in reaped {
            let lock_key = keys::seat_lock(&reservation.seat_id);
            if let Err(e) = self.locks.release(&lock_key, &reservation.user_id).await {
                error!(error = %e, seat_id = %reservation.seat_id, "failed to release seat lock during reap");
            }

            if let Err(e) = self
                .publisher
                .reservation_expired(&ReservationExpiredEvent {
                    reservation_id: reservation.id.clone(),
                    seat_id: reservation.seat_id.clone(),
                    user_id: reservation.user_id.clone(),
                    reason: "TIMEOUT",
                    timestamp: now,
                })
                .await
            {
                error!(error = %e, reservation_id = %reservation.id, "failed to publish reservation.expired");
            }

            if let Err(e) = self
                .publisher
                .seat_released(&SeatReleasedEvent {
                    seat_id: reservation.seat_id.clone(),
                    reservation_id: reservation.id.clone(),
                    user_id: reservation.user_id.clone(),
                    reason: "RESERVATION_EXPIRED",
                    timestamp: now,
                })
                .await
            {
                error!(error = %e, reservation_id = %reservation.id, "failed to publish seat.released");
            }
        }

        Ok(())
    }
}
