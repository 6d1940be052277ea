//! Core types shared across ytconv.
//!
//! Currently this is the error taxonomy of the update pipeline and the
//! user-facing error rendering used by the CLI.

pub mod error;

pub use error::{ErrorContext, UpdateError, user_friendly_error};

/// Result alias for the update pipeline.
pub type Result<T> = std::result::Result<T, UpdateError>;
