pub mod confirm;
pub mod reaper;
pub mod reserve;

pub use confirm::{ConfirmPaymentAction, ConfirmResponse};
pub use reaper::ExpirationReaper;
pub use reserve::{ReserveAction, ReserveInput, ReserveResponse};
