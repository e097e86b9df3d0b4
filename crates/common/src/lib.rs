//! Common types shared across Muster components.

#![warn(clippy::pedantic)]

/// Module for common identifier types
pub mod types;
