use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::domain::{Reservation, ReservationWithContext, Seat, SeatView};
use coordination::lock::LockStore;
use rust_decimal::Decimal;

/// Result of [`ReservationRepository::confirm_payment`]'s single transaction.
/// `confirmed`/`sold` mirror the row counts of their respective conditional
/// updates (0 or 1), so the caller can tell which step lost the race without
/// the transaction having committed any partial state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfirmPaymentOutcome {
    pub confirmed: u64,
    pub sold: u64,
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn seats_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<Seat>>;

    /// All-or-nothing: inserts one PENDING reservation per seat id, or none.
    async fn create_reservations_in_one_transaction(
        &self,
        seat_ids: &[String],
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Reservation>>;

    async fn find_reservation_with_seat_and_session(
        &self,
        id: &str,
    ) -> anyhow::Result<Option<ReservationWithContext>>;

    /// `UPDATE ... WHERE id=$1 AND status='PENDING' AND expires_at>=$2 SET status='CONFIRMED'`.
    /// Returns the number of affected rows (0 or 1).
    async fn conditional_confirm(&self, id: &str, now: DateTime<Utc>) -> anyhow::Result<u64>;

    /// `UPDATE ... WHERE id=$1 AND status='AVAILABLE' SET status='SOLD'`.
    async fn conditional_sell_seat(&self, seat_id: &str) -> anyhow::Result<u64>;

    async fn create_sale(
        &self,
        reservation_id: &str,
        amount: Decimal,
        payment_method: common::domain::PaymentMethod,
    ) -> anyhow::Result<()>;

    /// Confirm-Payment's three writes (confirm reservation, sell seat, record
    /// sale) as one transaction: if either conditional update affects zero
    /// rows, the whole transaction rolls back rather than leaving the
    /// reservation confirmed against an unsold seat or vice versa.
    async fn confirm_payment(
        &self,
        reservation_id: &str,
        seat_id: &str,
        amount: Decimal,
        payment_method: common::domain::PaymentMethod,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ConfirmPaymentOutcome>;

    /// `UPDATE ... WHERE id IN (...) AND status='PENDING' AND expires_at<$now
    /// SET status='CANCELLED' RETURNING id` — returns only the ids actually
    /// transitioned, since a candidate can be concurrently confirmed between
    /// being listed and this update running.
    async fn cancel_expired(&self, ids: &[String], now: DateTime<Utc>) -> anyhow::Result<Vec<String>>;

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Reservation>>;

    /// Loads seats for a session and folds in the lock store's view so a
    /// DB-AVAILABLE seat currently locked reads back as LOCKED.
    async fn seats_with_computed_status(
        &self,
        session_id: &str,
        lock_reader: &dyn LockStore,
    ) -> anyhow::Result<Vec<SeatView>>;
}
