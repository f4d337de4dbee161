pub mod auth;
pub mod error;
pub mod models;
pub mod openapi;
pub mod permissions;
pub mod rate_limit; // in-memory rate limiting
pub mod repo;
pub mod routes;
pub mod security;
pub mod synthesis;

// Re-export commonly used items for tests / external users
pub use rate_limit::RateLimiterFacade;
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
