//! Common utilities and types shared across the stream player crates.

#![warn(clippy::pedantic)]

/// Module for validated identifier types
pub mod types;

/// Module for observability configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;
