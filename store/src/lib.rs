pub mod db;
pub mod mock;
pub mod repository;
pub mod repository_pg;
pub mod schema;

pub use db::Db;
pub use mock::MockReservationRepository;
pub use repository::ReservationRepository;
pub use repository_pg::PgReservationRepository;
