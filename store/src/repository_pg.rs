use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::domain::{
    PaymentMethod, Reservation, ReservationStatus, ReservationWithContext, Seat, SeatStatus,
    SeatView, Session, new_id,
};
use coordination::keys;
use coordination::lock::LockStore;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use crate::repository::{ConfirmPaymentOutcome, ReservationRepository};

pub struct PgReservationRepository {
    pool: PgPool,
}

impl PgReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_seat(r: &sqlx::postgres::PgRow) -> anyhow::Result<Seat> {
    let status: String = r.get("status");
    Ok(Seat {
        id: r.get("id"),
        session_id: r.get("session_id"),
        row: r.get("seat_row"),
        number: r.get("number"),
        status: SeatStatus::parse(&status)?,
    })
}

fn row_to_reservation(r: &sqlx::postgres::PgRow) -> anyhow::Result<Reservation> {
    let status: String = r.get("status");
    Ok(Reservation {
        id: r.get("id"),
        user_id: r.get("user_id"),
        seat_id: r.get("seat_id"),
        status: ReservationStatus::parse(&status)?,
        expires_at: r.get("expires_at"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    async fn seats_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<Seat>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"SELECT id, session_id, seat_row, number, status::text AS status
               FROM seats WHERE id = ANY($1)"#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_seat).collect()
    }

    async fn create_reservations_in_one_transaction(
        &self,
        seat_ids: &[String],
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Reservation>> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let mut created = Vec::with_capacity(seat_ids.len());

        for seat_id in seat_ids {
            let id = new_id();
            sqlx::query(
                r#"INSERT INTO reservations (id, user_id, seat_id, status, expires_at, created_at, updated_at)
                   VALUES ($1, $2, $3, 'PENDING', $4, $5, $5)"#,
            )
            .bind(&id)
            .bind(user_id)
            .bind(seat_id)
            .bind(expires_at)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            created.push(Reservation {
                id,
                user_id: user_id.to_string(),
                seat_id: seat_id.clone(),
                status: ReservationStatus::Pending,
                expires_at,
                created_at: now,
                updated_at: now,
            });
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn find_reservation_with_seat_and_session(
        &self,
        id: &str,
    ) -> anyhow::Result<Option<ReservationWithContext>> {
        let row = sqlx::query(
            r#"SELECT
                 r.id AS r_id, r.user_id, r.seat_id, r.status::text AS r_status,
                 r.expires_at, r.created_at AS r_created_at, r.updated_at AS r_updated_at,
                 s.id AS s_id, s.session_id, s.seat_row, s.number, s.status::text AS s_status,
                 sess.id AS sess_id, sess.movie_id, sess.room, sess.price,
                 sess.starts_at, sess.created_at AS sess_created_at, sess.updated_at AS sess_updated_at
               FROM reservations r
               JOIN seats s ON s.id = r.seat_id
               JOIN sessions sess ON sess.id = s.session_id
               WHERE r.id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let reservation = Reservation {
            id: row.get("r_id"),
            user_id: row.get("user_id"),
            seat_id: row.get("seat_id"),
            status: ReservationStatus::parse(&row.get::<String, _>("r_status"))?,
            expires_at: row.get("expires_at"),
            created_at: row.get("r_created_at"),
            updated_at: row.get("r_updated_at"),
        };
        let seat = Seat {
            id: row.get("s_id"),
            session_id: row.get("session_id"),
            row: row.get("seat_row"),
            number: row.get("number"),
            status: SeatStatus::parse(&row.get::<String, _>("s_status"))?,
        };
        let session = Session {
            id: row.get("sess_id"),
            movie_id: row.get("movie_id"),
            room: row.get("room"),
            price: row.get("price"),
            starts_at: row.get("starts_at"),
            created_at: row.get("sess_created_at"),
            updated_at: row.get("sess_updated_at"),
        };

        Ok(Some(ReservationWithContext { reservation, seat, session }))
    }

    async fn conditional_confirm(&self, id: &str, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"UPDATE reservations
               SET status = 'CONFIRMED', updated_at = $2
               WHERE id = $1 AND status = 'PENDING' AND expires_at >= $2"#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn conditional_sell_seat(&self, seat_id: &str) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"UPDATE seats SET status = 'SOLD' WHERE id = $1 AND status = 'AVAILABLE'"#,
        )
        .bind(seat_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn create_sale(
        &self,
        reservation_id: &str,
        amount: Decimal,
        payment_method: PaymentMethod,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO sales (id, reservation_id, amount, payment_method, created_at)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (reservation_id) DO NOTHING"#,
        )
        .bind(new_id())
        .bind(reservation_id)
        .bind(amount)
        .bind(payment_method.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

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
        let mut tx = self.pool.begin().await?;

        let confirmed = sqlx::query(
            r#"UPDATE reservations
               SET status = 'CONFIRMED', updated_at = $2
               WHERE id = $1 AND status = 'PENDING' AND expires_at >= $2"#,
        )
        .bind(reservation_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if confirmed == 0 {
            tx.rollback().await?;
            return Ok(ConfirmPaymentOutcome { confirmed: 0, sold: 0 });
        }

        let sold = sqlx::query(r#"UPDATE seats SET status = 'SOLD' WHERE id = $1 AND status = 'AVAILABLE'"#)
            .bind(seat_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if sold == 0 {
            tx.rollback().await?;
            return Ok(ConfirmPaymentOutcome { confirmed, sold: 0 });
        }

        sqlx::query(
            r#"INSERT INTO sales (id, reservation_id, amount, payment_method, created_at)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (reservation_id) DO NOTHING"#,
        )
        .bind(new_id())
        .bind(reservation_id)
        .bind(amount)
        .bind(payment_method.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ConfirmPaymentOutcome { confirmed, sold })
    }

    async fn cancel_expired(&self, ids: &[String], now: DateTime<Utc>) -> anyhow::Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"UPDATE reservations
               SET status = 'CANCELLED', updated_at = $2
               WHERE id = ANY($1) AND status = 'PENDING' AND expires_at < $2
               RETURNING id"#,
        )
        .bind(ids)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get::<String, _>("id")).collect())
    }

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"SELECT id, user_id, seat_id, status::text AS status, expires_at, created_at, updated_at
               FROM reservations
               WHERE status = 'PENDING' AND expires_at < $1"#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_reservation).collect()
    }

    async fn seats_with_computed_status(
        &self,
        session_id: &str,
        lock_reader: &dyn LockStore,
    ) -> anyhow::Result<Vec<SeatView>> {
        let rows = sqlx::query(
            r#"SELECT id, session_id, seat_row, number, status::text AS status
               FROM seats WHERE session_id = $1"#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let seats: Vec<Seat> = rows.iter().map(row_to_seat).collect::<anyhow::Result<_>>()?;

        let lock_keys: Vec<String> = seats
            .iter()
            .map(|s| keys::seat_lock(&s.id))
            .collect();
        let owners = lock_reader.get_many(&lock_keys).await?;

        let views = seats
            .into_iter()
            .zip(owners)
            .map(|(seat, owner)| {
                let status = match (seat.status, owner) {
                    (SeatStatus::Available, Some(_)) => SeatStatus::Locked,
                    (other, _) => other,
                };
                SeatView { seat, status }
            })
            .collect();

        Ok(views)
    }
}
