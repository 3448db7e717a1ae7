use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationCreatedEvent {
    pub id: String,
    pub user_id: String,
    pub seat_id: String,
    pub status: &'static str,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmedEvent {
    pub reservation_id: String,
    pub user_id: String,
    pub seat_id: String,
    pub amount: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationExpiredEvent {
    pub reservation_id: String,
    pub seat_id: String,
    pub user_id: String,
    pub reason: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatReleasedEvent {
    pub seat_id: String,
    pub reservation_id: String,
    pub user_id: String,
    pub reason: &'static str,
    pub timestamp: DateTime<Utc>,
}
