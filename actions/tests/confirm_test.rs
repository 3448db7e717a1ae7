use std::sync::Arc;

use actions::{ConfirmPaymentAction, ReserveAction, ReserveInput};
use chrono::{Duration as ChronoDuration, Utc};
use common::domain::{Seat, SeatStatus, Session};
use coordination::idempotency::mock::MockIdempotencyStore;
use coordination::lock::mock::MockLockStore;
use coordination::LockStore;
use events::MockEventPublisher;
use rust_decimal::Decimal;
use store::MockReservationRepository;
use store::ReservationRepository;

fn mk_session() -> Session {
    let now = Utc::now();
    Session {
        id: "sess-1".into(),
        movie_id: "movie-1".into(),
        room: "A".into(),
        price: Decimal::new(2500, 2),
        starts_at: now + ChronoDuration::hours(2),
        created_at: now,
        updated_at: now,
    }
}

fn mk_seat(id: &str) -> Seat {
    Seat { id: id.into(), session_id: "sess-1".into(), row: "A".into(), number: 1, status: SeatStatus::Available }
}

async fn reserve_one(repo: Arc<MockReservationRepository>, locks: Arc<MockLockStore>, publisher: Arc<MockEventPublisher>) -> String {
    let reserve = ReserveAction::new(repo, locks, Arc::new(MockIdempotencyStore::new()), publisher);
    let resp = reserve
        .execute(ReserveInput { user_id: "u1".into(), seat_ids: vec!["s1".into()], idempotency_key: None })
        .await
        .unwrap();
    resp.reservation_ids[0].clone()
}

#[tokio::test]
async fn confirm_flips_reservation_and_seat_and_records_sale() {
    let repo = Arc::new(MockReservationRepository::new());
    repo.insert_session(mk_session());
    repo.insert_seat(mk_seat("s1"));
    let locks = Arc::new(MockLockStore::new());
    let publisher = Arc::new(MockEventPublisher::new());

    let reservation_id = reserve_one(repo.clone(), locks.clone(), publisher.clone()).await;

    let confirm = ConfirmPaymentAction::new(repo.clone(), locks.clone(), publisher.clone());
    let resp = confirm.execute(&reservation_id).await.unwrap();

    assert_eq!(resp.amount, Decimal::new(2500, 2));
    assert_eq!(
        repo.reservations.lock().get(&reservation_id).unwrap().status,
        common::domain::ReservationStatus::Confirmed
    );
    assert_eq!(repo.seats.lock().get("s1").unwrap().status, SeatStatus::Sold);
    assert_eq!(repo.sales.lock().len(), 1);

    let lock_owner = locks
        .get_many(&[coordination::keys::seat_lock("s1")])
        .await
        .unwrap()
        .pop()
        .unwrap();
    assert!(lock_owner.is_none());
}

#[tokio::test]
async fn second_confirm_is_conflict_and_emits_no_further_events() {
    let repo = Arc::new(MockReservationRepository::new());
    repo.insert_session(mk_session());
    repo.insert_seat(mk_seat("s1"));
    let locks = Arc::new(MockLockStore::new());
    let publisher = Arc::new(MockEventPublisher::new());

    let reservation_id = reserve_one(repo.clone(), locks.clone(), publisher.clone()).await;

    let confirm = ConfirmPaymentAction::new(repo.clone(), locks.clone(), publisher.clone());
    confirm.execute(&reservation_id).await.unwrap();
    let events_after_first = publisher.events.lock().len();

    let err = confirm.execute(&reservation_id).await.unwrap_err();
    assert!(matches!(err, common::AppError::Conflict(_)));
    assert_eq!(publisher.events.lock().len(), events_after_first);
}

#[tokio::test]
async fn confirm_after_expiry_cancels_and_returns_bad_request() {
    let repo = Arc::new(MockReservationRepository::new());
    repo.insert_session(mk_session());
    repo.insert_seat(mk_seat("s1"));

    let created = repo
        .create_reservations_in_one_transaction(&["s1".into()], "u1", Utc::now() - ChronoDuration::seconds(1))
        .await
        .unwrap();
    let reservation_id = created[0].id.clone();

    let locks = Arc::new(MockLockStore::new());
    let publisher = Arc::new(MockEventPublisher::new());
    let confirm = ConfirmPaymentAction::new(repo.clone(), locks, publisher.clone());

    let err = confirm.execute(&reservation_id).await.unwrap_err();
    assert!(matches!(err, common::AppError::BadRequest(_)));
    assert_eq!(
        repo.reservations.lock().get(&reservation_id).unwrap().status,
        common::domain::ReservationStatus::Cancelled
    );
    assert!(publisher.events.lock().is_empty());
}
