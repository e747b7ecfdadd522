pub mod error;
pub mod limiters;

pub use error::{ApiError, ErrorResponse};
pub use limiters::{LimiterError, Limiters};
