//! Reserve Action (SPEC_FULL.md §4.5): the heart of the system. Sorts seat
//! ids into a global lock order, acquires per-seat locks, persists PENDING
//! reservations in one transaction, and publishes `reservation.created`.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::domain::SeatStatus;
use common::{AppError, AppResult};
use coordination::idempotency::{ClaimOutcome, IdempotencyStore};
use coordination::keys;
use coordination::lock::LockStore;
use events::{EventPublisher, ReservationCreatedEvent};
use serde::{Deserialize, Serialize};
use store::ReservationRepository;
use tracing::{instrument, warn};

const SEAT_LOCK_TTL_MS: i64 = 30_000;
const RESERVATION_TTL_SECONDS: i64 = 30;
const IDEMPOTENCY_TTL_MS: i64 = 60_000;

#[derive(Clone, Debug)]
pub struct ReserveInput {
    pub user_id: String,
    pub seat_ids: Vec<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReserveResponse {
    pub message: String,
    pub reservation_ids: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub expires_in_seconds: i64,
}

pub struct ReserveAction {
    repo: Arc<dyn ReservationRepository>,
    locks: Arc<dyn LockStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl ReserveAction {
    pub fn new(
        repo: Arc<dyn ReservationRepository>,
        locks: Arc<dyn LockStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { repo, locks, idempotency, publisher }
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id, seat_count = input.seat_ids.len()))]
    pub async fn execute(&self, input: ReserveInput) -> AppResult<ReserveResponse> {
        if input.seat_ids.is_empty() {
            return Err(AppError::bad_request("seatIds must not be empty"));
        }

        let cache_key = keys::normalize_idempotency_key(input.idempotency_key.as_deref())
            .map(|k| keys::idempotency(&input.user_id, &k));

        if let Some(cache_key) = &cache_key {
            match self.idempotency.claim(cache_key, IDEMPOTENCY_TTL_MS).await? {
                ClaimOutcome::Hit(cached) => return decode_response(cached),
                ClaimOutcome::Pending => {
                    return match self.idempotency.poll_until_ready(cache_key).await? {
                        Some(v) => decode_response(v),
                        None => Err(AppError::conflict("request already in progress, retry")),
                    };
                }
                ClaimOutcome::FirstWriter => {}
            }
        }

        match self.do_reserve(&input).await {
            Ok(resp) => {
                if let Some(cache_key) = &cache_key {
                    if let Ok(value) = serde_json::to_value(&resp) {
                        if let Err(e) = self.idempotency.store(cache_key, &value, IDEMPOTENCY_TTL_MS).await {
                            warn!(error = %e, "failed to cache reserve response");
                        }
                    }
                }
                Ok(resp)
            }
            Err(e) => {
                if let Some(cache_key) = &cache_key {
                    if let Err(forget_err) = self.idempotency.forget(cache_key).await {
                        warn!(error = %forget_err, "failed to delete idempotency marker after failure");
                    }
                }
                Err(e)
            }
        }
    }

    async fn do_reserve(&self, input: &ReserveInput) -> AppResult<ReserveResponse> {
        let mut seat_ids = input.seat_ids.clone();
        seat_ids.sort();
        seat_ids.dedup();

        let seats = common::logging::warn_if_slow(
            "db_seats_by_ids",
            std::time::Duration::from_millis(100),
            self.repo.seats_by_ids(&seat_ids),
        )
        .await?;
        if seats.len() != seat_ids.len() {
            return Err(AppError::not_found("one or more seats do not exist"));
        }

        let unavailable: Vec<&str> = seats
            .iter()
            .filter(|s| s.status != SeatStatus::Available)
            .map(|s| s.id.as_str())
            .collect();
        if !unavailable.is_empty() {
            return Err(AppError::conflict(format!(
                "seats not available: {}",
                unavailable.join(", ")
            )));
        }

        let mut acquired_keys: Vec<String> = Vec::with_capacity(seat_ids.len());
        for seat_id in &seat_ids {
            let key = keys::seat_lock(seat_id);
            let acquired = self.locks.acquire(&key, &input.user_id, SEAT_LOCK_TTL_MS).await?;
            if !acquired {
                self.best_effort_release(&acquired_keys).await;
                return Err(AppError::conflict(format!("seat {seat_id} is already being reserved")));
            }
            acquired_keys.push(key);
        }

        let expires_at = Utc::now() + ChronoDuration::seconds(RESERVATION_TTL_SECONDS);
        let reservations = match common::logging::warn_if_slow(
            "db_create_reservations",
            std::time::Duration::from_millis(150),
            self.repo.create_reservations_in_one_transaction(&seat_ids, &input.user_id, expires_at),
        )
        .await
        {
            Ok(r) => r,
            Err(e) => {
                self.best_effort_release(&acquired_keys).await;
                return Err(AppError::from(e));
            }
        };

        for r in &reservations {
            let event = ReservationCreatedEvent {
                id: r.id.clone(),
                user_id: r.user_id.clone(),
                seat_id: r.seat_id.clone(),
                status: "PENDING",
                expires_at: r.expires_at,
            };
            if let Err(e) = self.publisher.reservation_created(&event).await {
                warn!(error = %e, reservation_id = %r.id, "failed to publish reservation.created");
            }
        }

        Ok(ReserveResponse {
            message: "Reservation created".to_string(),
            reservation_ids: reservations.into_iter().map(|r| r.id).collect(),
            expires_at,
            expires_in_seconds: RESERVATION_TTL_SECONDS,
        })
    }

    async fn best_effort_release(&self, keys: &[String]) {
        if let Err(e) = self.locks.release_all(keys).await {
            warn!(error = %e, "failed to roll back acquired seat locks");
        }
    }
}

fn decode_response(value: serde_json::Value) -> AppResult<ReserveResponse> {
    serde_json::from_value(value).map_err(|e| AppError::from(anyhow::Error::from(e)))
}
