//! In-memory fake for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::domain::{
    PaymentMethod, Reservation, ReservationStatus, ReservationWithContext, Sale, Seat,
    SeatStatus, SeatView, Session, new_id,
};
use coordination::keys;
use coordination::lock::LockStore;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::repository::{ConfirmPaymentOutcome, ReservationRepository};

pub struct MockReservationRepository {
    pub sessions: Mutex<HashMap<String, Session>>,
    pub seats: Mutex<HashMap<String, Seat>>,
    pub reservations: Mutex<HashMap<String, Reservation>>,
    pub sales: Mutex<HashMap<String, Sale>>,
}

impl MockReservationRepository {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            seats: Mutex::new(HashMap::new()),
            reservations: Mutex::new(HashMap::new()),
            sales: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert_session(&self, session: Session) {
        self.sessions.lock().insert(session.id.clone(), session);
    }

    pub fn insert_seat(&self, seat: Seat) {
        self.seats.lock().insert(seat.id.clone(), seat);
    }
}

impl Default for MockReservationRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReservationRepository for MockReservationRepository {
    async fn seats_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<Seat>> {
        let seats = self.seats.lock();
        Ok(ids.iter().filter_map(|id| seats.get(id).cloned()).collect())
    }

    async fn create_reservations_in_one_transaction(
        &self,
        seat_ids: &[String],
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Reservation>> {
        let now = Utc::now();
        let mut reservations = self.reservations.lock();
        let mut created = Vec::with_capacity(seat_ids.len());

        for seat_id in seat_ids {
            let r = Reservation {
                id: new_id(),
                user_id: user_id.to_string(),
                seat_id: seat_id.clone(),
                status: ReservationStatus::Pending,
                expires_at,
                created_at: now,
                updated_at: now,
            };
            reservations.insert(r.id.clone(), r.clone());
            created.push(r);
        }

        Ok(created)
    }

    async fn find_reservation_with_seat_and_session(
        &self,
        id: &str,
    ) -> anyhow::Result<Option<ReservationWithContext>> {
        let Some(reservation) = self.reservations.lock().get(id).cloned() else {
            return Ok(None);
        };
        let Some(seat) = self.seats.lock().get(&reservation.seat_id).cloned() else {
            return Ok(None);
        };
        let Some(session) = self.sessions.lock().get(&seat.session_id).cloned() else {
            return Ok(None);
        };

        Ok(Some(ReservationWithContext { reservation, seat, session }))
    }

    async fn conditional_confirm(&self, id: &str, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut reservations = self.reservations.lock();
        if let Some(r) = reservations.get_mut(id) {
            if r.status == ReservationStatus::Pending && r.expires_at >= now {
                r.status = ReservationStatus::Confirmed;
                r.updated_at = now;
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn conditional_sell_seat(&self, seat_id: &str) -> anyhow::Result<u64> {
        let mut seats = self.seats.lock();
        if let Some(s) = seats.get_mut(seat_id) {
            if s.status == SeatStatus::Available {
                s.status = SeatStatus::Sold;
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn create_sale(
        &self,
        reservation_id: &str,
        amount: Decimal,
        payment_method: PaymentMethod,
    ) -> anyhow::Result<()> {
        let mut sales = self.sales.lock();
        if sales.values().any(|s| s.reservation_id == reservation_id) {
            return Ok(());
        }
        sales.insert(
            reservation_id.to_string(),
            Sale {
                id: new_id(),
                reservation_id: reservation_id.to_string(),
                amount,
                payment_method,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn confirm_payment(
        &self,
        reservation_id: &str,
        seat_id: &str,
        amount: Decimal,
        payment_method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ConfirmPaymentOutcome> {
        let confirmed = self.conditional_confirm(reservation_id, now).await?;
        if confirmed == 0 {
            return Ok(ConfirmPaymentOutcome { confirmed: 0, sold: 0 });
        }

        let sold = self.conditional_sell_seat(seat_id).await?;
        if sold == 0 {
            // Roll back the confirm, mirroring the real transaction's rollback.
            if let Some(r) = self.reservations.lock().get_mut(reservation_id) {
                r.status = ReservationStatus::Pending;
            }
            return Ok(ConfirmPaymentOutcome { confirmed, sold: 0 });
        }

        self.create_sale(reservation_id, amount, payment_method).await?;
        Ok(ConfirmPaymentOutcome { confirmed, sold })
    }

    async fn cancel_expired(&self, ids: &[String], now: DateTime<Utc>) -> anyhow::Result<Vec<String>> {
        let mut reservations = self.reservations.lock();
        let mut transitioned = Vec::new();
        for id in ids {
            if let Some(r) = reservations.get_mut(id) {
                if r.status == ReservationStatus::Pending && r.expires_at < now {
                    r.status = ReservationStatus::Cancelled;
                    r.updated_at = now;
                    transitioned.push(id.clone());
                }
            }
        }
        Ok(transitioned)
    }

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Reservation>> {
        let reservations = self.reservations.lock();
        Ok(reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Pending && r.expires_at < now)
            .cloned()
            .collect())
    }

    async fn seats_with_computed_status(
        &self,
        session_id: &str,
        lock_reader: &dyn LockStore,
    ) -> anyhow::Result<Vec<SeatView>> {
        let seats: Vec<Seat> = self
            .seats
            .lock()
            .values()
            .filter(|s| s.session_id == session_id)
            .cloned()
            .collect();

        let lock_keys: Vec<String> = seats.iter().map(|s| keys::seat_lock(&s.id)).collect();
        let owners = lock_reader.get_many(&lock_keys).await?;

        Ok(seats
            .into_iter()
            .zip(owners)
            .map(|(seat, owner)| {
                let status = match (seat.status, owner) {
                    (SeatStatus::Available, Some(_)) => SeatStatus::Locked,
                    (other, _) => other,
                };
                SeatView { seat, status }
            })
            .collect())
    }
}
