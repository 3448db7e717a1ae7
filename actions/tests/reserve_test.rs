use std::sync::Arc;

use actions::{ReserveAction, ReserveInput};
use chrono::{Duration as ChronoDuration, Utc};
use common::domain::{Seat, SeatStatus, Session};
use coordination::lock::mock::MockLockStore;
use coordination::LockStore;
use events::MockEventPublisher;
use rust_decimal::Decimal;
use store::MockReservationRepository;

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

fn mk_seat(id: &str, row: &str, number: i32) -> Seat {
    Seat {
        id: id.into(),
        session_id: "sess-1".into(),
        row: row.into(),
        number,
        status: SeatStatus::Available,
    }
}

fn setup(seat_ids: &[&str]) -> (Arc<MockReservationRepository>, Arc<MockLockStore>, Arc<MockEventPublisher>) {
    let repo = Arc::new(MockReservationRepository::new());
    repo.insert_session(mk_session());
    for (i, id) in seat_ids.iter().enumerate() {
        repo.insert_seat(mk_seat(id, "A", i as i32 + 1));
    }
    (repo, Arc::new(MockLockStore::new()), Arc::new(MockEventPublisher::new()))
}

fn action(
    repo: Arc<MockReservationRepository>,
    locks: Arc<MockLockStore>,
    publisher: Arc<MockEventPublisher>,
) -> ReserveAction {
    ReserveAction::new(
        repo,
        locks,
        Arc::new(coordination::idempotency::mock::MockIdempotencyStore::new()),
        publisher,
    )
}

#[tokio::test]
async fn rejects_empty_seat_list() {
    let (repo, locks, publisher) = setup(&[]);
    let action = action(repo, locks, publisher);

    let err = action
        .execute(ReserveInput { user_id: "u1".into(), seat_ids: vec![], idempotency_key: None })
        .await
        .unwrap_err();

    assert!(matches!(err, common::AppError::BadRequest(_)));
}

#[tokio::test]
async fn rejects_missing_seat() {
    let (repo, locks, publisher) = setup(&["s1"]);
    let action = action(repo, locks, publisher);

    let err = action
        .execute(ReserveInput {
            user_id: "u1".into(),
            seat_ids: vec!["s404".into()],
            idempotency_key: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, common::AppError::NotFound(_)));
}

#[tokio::test]
async fn happy_path_creates_one_pending_reservation_per_seat() {
    let (repo, locks, publisher) = setup(&["s1", "s2"]);
    let action = action(repo.clone(), locks.clone(), publisher.clone());

    let resp = action
        .execute(ReserveInput {
            user_id: "u1".into(),
            seat_ids: vec!["s1".into(), "s2".into()],
            idempotency_key: None,
        })
        .await
        .unwrap();

    assert_eq!(resp.reservation_ids.len(), 2);
    assert_eq!(repo.reservations.lock().len(), 2);
    assert_eq!(publisher.events.lock().len(), 2);
}

/// Scenario 1: double-booking under race. Two users race for the same
/// seat; exactly one wins, the DB ends with exactly one PENDING
/// reservation, and the lock holds the winner's userId.
#[tokio::test]
async fn double_booking_race_has_exactly_one_winner() {
    let (repo, locks, publisher) = setup(&["s1"]);
    let action_a = action(repo.clone(), locks.clone(), publisher.clone());
    let action_b = action(repo.clone(), locks.clone(), publisher.clone());

    let (res_a, res_b) = tokio::join!(
        action_a.execute(ReserveInput { user_id: "A".into(), seat_ids: vec!["s1".into()], idempotency_key: None }),
        action_b.execute(ReserveInput { user_id: "B".into(), seat_ids: vec!["s1".into()], idempotency_key: None }),
    );

    let successes = [&res_a, &res_b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);

    assert_eq!(repo.reservations.lock().len(), 1);

    let winner_reservation = repo.reservations.lock().values().next().cloned().unwrap();
    let lock_owner = locks
        .get_many(&[coordination::keys::seat_lock("s1")])
        .await
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(lock_owner.as_deref(), Some(winner_reservation.user_id.as_str()));
}

/// Scenario 2: idempotent retry. Same (userId, idempotencyKey) issued
/// concurrently must produce byte-identical responses and create at most
/// one set of reservations.
#[tokio::test]
async fn idempotent_retry_creates_one_reservation_set() {
    let (repo, locks, publisher) = setup(&["s1"]);
    let idempotency = Arc::new(coordination::idempotency::mock::MockIdempotencyStore::new());

    let action_1 = ReserveAction::new(repo.clone(), locks.clone(), idempotency.clone(), publisher.clone());
    let action_2 = ReserveAction::new(repo.clone(), locks.clone(), idempotency.clone(), publisher.clone());

    let input = |uid: &str| ReserveInput {
        user_id: uid.into(),
        seat_ids: vec!["s1".into()],
        idempotency_key: Some("demo-1".into()),
    };

    let resp1 = action_1.execute(input("u1")).await.unwrap();
    let resp2 = action_2.execute(input("u1")).await.unwrap();

    assert_eq!(resp1, resp2);
    assert_eq!(repo.reservations.lock().len(), 1);
    assert_eq!(publisher.events.lock().len(), 1);
}

/// Scenario 3: multi-seat deadlock avoidance. Two users request the same
/// pair of seats in opposite order; sorting seat ids before acquiring locks
/// means neither can wait on the other.
#[tokio::test]
async fn multi_seat_requests_in_opposite_order_do_not_deadlock() {
    let (repo, locks, publisher) = setup(&["s1", "s2"]);
    let action_a = action(repo.clone(), locks.clone(), publisher.clone());
    let action_b = action(repo.clone(), locks.clone(), publisher.clone());

    let result = tokio::time::timeout(std::time::Duration::from_secs(1), async {
        tokio::join!(
            action_a.execute(ReserveInput {
                user_id: "A".into(),
                seat_ids: vec!["s2".into(), "s1".into()],
                idempotency_key: None,
            }),
            action_b.execute(ReserveInput {
                user_id: "B".into(),
                seat_ids: vec!["s1".into(), "s2".into()],
                idempotency_key: None,
            }),
        )
    })
    .await
    .expect("calls must not block on each other");

    let (res_a, res_b) = result;
    let successes = [&res_a, &res_b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);

    let winner = if res_a.is_ok() { res_a.unwrap() } else { res_b.unwrap() };
    assert_eq!(winner.reservation_ids.len(), 2);
}
