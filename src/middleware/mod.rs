//! HTTP middleware and extractors
//!
//! - `AuthUser` extractor for handlers requiring an authenticated actor

pub mod auth;

pub use auth::AuthUser;
