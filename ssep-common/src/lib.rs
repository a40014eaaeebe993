//! # ssep common library
//!
//! Shared code for the speech separation service:
//! - Common error type
//! - Configuration model and source resolution
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod time;

pub use config::ServiceConfig;
pub use error::{Error, Result};
