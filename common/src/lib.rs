pub mod domain;
pub mod error;
pub mod logging;
pub mod time;

pub use error::{AppError, AppResult};
