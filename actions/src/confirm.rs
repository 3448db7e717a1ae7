//! Confirm-Payment Action (SPEC_FULL.md §4.6): classifies the reservation,
//! then flips it and its seat and records the sale in one repository
//! transaction, and releases the seat lock best-effort.

use std::sync::Arc;

use chrono::Utc;
use common::domain::ReservationStatus;
use common::{AppError, AppResult};
use coordination::keys;
use coordination::lock::LockStore;
use events::{EventPublisher, PaymentConfirmedEvent};
use store::ReservationRepository;
use tracing::{instrument, warn};

pub struct ConfirmPaymentAction {
    repo: Arc<dyn ReservationRepository>,
    locks: Arc<dyn LockStore>,
    publisher: Arc<dyn EventPublisher>,
}

#[derive(Clone, Debug)]
pub struct ConfirmResponse {
    pub reservation_id: String,
    pub seat_id: String,
    pub amount: rust_decimal::Decimal,
}

impl ConfirmPaymentAction {
    pub fn new(
        repo: Arc<dyn ReservationRepository>,
        locks: Arc<dyn LockStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { repo, locks, publisher }
    }

    #[instrument(skip(self), fields(reservation_id = %reservation_id))]
    pub async fn execute(&self, reservation_id: &str) -> AppResult<ConfirmResponse> {
        let ctx = self
            .repo
            .find_reservation_with_seat_and_session(reservation_id)
            .await?
            .ok_or_else(|| AppError::not_found("reservation not found"))?;

        match ctx.reservation.status {
            ReservationStatus::Confirmed => return Err(AppError::conflict("already paid")),
            ReservationStatus::Cancelled => return Err(AppError::bad_request("cancelled or expired")),
            ReservationStatus::Pending => {}
        }

        let now = Utc::now();
        if now > ctx.reservation.expires_at {
            self.repo.cancel_expired(&[reservation_id.to_string()], now).await?;
            return Err(AppError::bad_request("reservation expired"));
        }

        let outcome = self
            .repo
            .confirm_payment(
                reservation_id,
                &ctx.reservation.seat_id,
                ctx.session.price,
                common::domain::PaymentMethod::default(),
                now,
            )
            .await?;

        if outcome.confirmed == 0 {
            return Err(self.classify_conflict(reservation_id).await);
        }
        if outcome.sold == 0 {
            return Err(AppError::conflict("seat already sold"));
        }

        let event = PaymentConfirmedEvent {
            reservation_id: reservation_id.to_string(),
            user_id: ctx.reservation.user_id.clone(),
            seat_id: ctx.reservation.seat_id.clone(),
            amount: ctx.session.price.to_string(),
            timestamp: now,
        };
        if let Err(e) = self.publisher.payment_confirmed(&event).await {
            warn!(error = %e, reservation_id, "failed to publish payment.confirmed");
        }

        let lock_key = keys::seat_lock(&ctx.reservation.seat_id);
        if let Err(e) = self.locks.release(&lock_key, &ctx.reservation.user_id).await {
            warn!(error = %e, seat_id = %ctx.reservation.seat_id, "failed to release seat lock after confirm");
        }

        Ok(ConfirmResponse {
            reservation_id: reservation_id.to_string(),
            seat_id: ctx.reservation.seat_id,
            amount: ctx.session.price,
        })
    }

    /// `confirm_payment`'s confirm step affected zero rows; reload to explain why.
    async fn classify_conflict(&self, reservation_id: &str) -> AppError {
        match self.repo.find_reservation_with_seat_and_session(reservation_id).await {
            Ok(Some(ctx)) => match ctx.reservation.status {
                ReservationStatus::Confirmed => AppError::conflict("already paid"),
                ReservationStatus::Cancelled => AppError::bad_request("cancelled or expired"),
                ReservationStatus::Pending => AppError::conflict("confirmation failed"),
            },
            Ok(None) => AppError::not_found("reservation not found"),
            Err(e) => AppError::from(e),
        }
    }
}
