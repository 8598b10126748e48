//! Shared types and error-context machinery used across all crosspost crates.

pub mod error;
pub mod types;

pub use error::FromMessage;
