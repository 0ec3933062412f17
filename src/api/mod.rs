//! Management API: axum routes translating HTTP requests into control plane
//! mutations.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::{build_router, ApiState};
pub use server::start_api_server;
