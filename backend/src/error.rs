pub use common::{AppError, AppResult};
