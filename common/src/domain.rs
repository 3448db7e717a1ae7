use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Status of a seat row. `Locked` is never written to the database — see
/// `SeatView` below. It exists in this enum purely so the read path can
/// express the computed view with the same type the write path uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeatStatus {
    Available,
    Locked,
    Sold,
}

impl SeatStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Locked => "LOCKED",
            Self::Sold => "SOLD",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "AVAILABLE" => Ok(Self::Available),
            "LOCKED" => Ok(Self::Locked),
            "SOLD" => Ok(Self::Sold),
            other => anyhow::bail!("invalid seat status: {other}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => anyhow::bail!("invalid reservation status: {other}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Pix,
    Cash,
}

impl PaymentMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreditCard => "CREDIT_CARD",
            Self::DebitCard => "DEBIT_CARD",
            Self::Pix => "PIX",
            Self::Cash => "CASH",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "CREDIT_CARD" => Ok(Self::CreditCard),
            "DEBIT_CARD" => Ok(Self::DebitCard),
            "PIX" => Ok(Self::Pix),
            "CASH" => Ok(Self::Cash),
            other => anyhow::bail!("invalid payment method: {other}"),
        }
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        Self::CreditCard
    }
}

#[derive(Clone, Debug)]
pub struct Session {
    pub id: String,
    pub movie_id: String,
    pub room: String,
    pub price: Decimal,
    pub starts_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct Seat {
    pub id: String,
    pub session_id: String,
    pub row: String,
    pub number: i32,
    pub status: SeatStatus,
}

/// Read-side projection of a seat with the lock store's view folded in (see
/// SPEC_FULL.md §3.1). `db_status` is always what the repository stored;
/// `status` is the client-facing value, which is `Locked` instead of
/// `Available` whenever the seat's lock key is currently present.
#[derive(Clone, Debug)]
pub struct SeatView {
    pub seat: Seat,
    pub status: SeatStatus,
}

#[derive(Clone, Debug)]
pub struct Reservation {
    pub id: String,
    pub user_id: String,
    pub seat_id: String,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct Sale {
    pub id: String,
    pub reservation_id: String,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
}

/// A reservation joined with its seat and session, as loaded by
/// `findReservationWithSeatAndSession` (SPEC_FULL.md §4.4). Confirm-Payment
/// needs all three to classify state and to price the sale.
#[derive(Clone, Debug)]
pub struct ReservationWithContext {
    pub reservation: Reservation,
    pub seat: Seat,
    pub session: Session,
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
