//! HTTP surface: router, handlers, request/response types and error mapping.

pub mod error;
pub mod router;
pub mod types;

pub use error::ApiError;
pub use router::{api_router, AppState};
