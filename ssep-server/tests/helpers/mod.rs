//! Test Helper Utilities
//!
//! Shared utilities for testing ssep-server

#![allow(dead_code)]

pub mod audio_generator;
pub mod mock_models;
pub mod test_app;

pub use audio_generator::{generate_test_wav, AudioConfig};
pub use mock_models::{CountingSeparator, FailingSeparator, FixedQualityModel, ScaledSeparator, SlowSeparator};
pub use test_app::{multipart_body, multipart_content_type, wait_for_terminal, TestApp};
