//! FI Registry - Financial Institution Directory Backend
//!
//! This crate provides a REST backend for managing a directory of financial
//! institutions, their verified email domains, and reference lookup tables,
//! with a versioned audit-history subsystem recording every tracked mutation.

pub mod api;
pub mod audit;
pub mod config;
pub mod domain;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod policy;
pub mod repository;
pub mod server;
pub mod service;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
