//! Error handling for ytconv
//!
//! The update pipeline reports failures through a single strongly-typed enum,
//! [`UpdateError`], whose variants mirror the recovery policy of each failure class:
//!
//! | Variant | Retried | On-disk effect |
//! |---------|---------|----------------|
//! | [`UpdateError::NotFound`] | never | none, treated as "up to date" |
//! | [`UpdateError::Transport`] | with backoff, bounded | none |
//! | [`UpdateError::Integrity`] | never on the same resolved asset | partial file discarded |
//! | [`UpdateError::Apply`] | no | swapped files rolled back first |
//! | [`UpdateError::ConcurrentOperation`] | no | none |
//!
//! The CLI layer works with `anyhow::Error`; [`user_friendly_error`] turns any error
//! into an [`ErrorContext`] carrying a suggestion and details for display.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ytconv::core::{ErrorContext, UpdateError};
//!
//! let ctx = ErrorContext::new(UpdateError::ConcurrentOperation)
//!     .with_suggestion("Wait for the running update to finish");
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::update::{Component, ComponentPhase};

/// Errors produced by the update pipeline.
#[derive(Error, Debug, Clone)]
pub enum UpdateError {
    /// The release index has no entry matching the selection rule.
    #[error("No release found for {subject}")]
    NotFound {
        /// What was looked up (channel, tag, or version).
        subject: String,
    },

    /// Network or transfer failure; transient and retried with backoff.
    #[error("Transport error while {operation}: {reason}")]
    Transport {
        /// The operation in progress.
        operation: String,
        /// Underlying cause.
        reason: String,
    },

    /// Downloaded bytes did not match the declared checksum or size.
    #[error("Integrity check failed for '{asset}': expected {expected}, got {actual}")]
    Integrity {
        /// Asset name.
        asset: String,
        /// Declared value.
        expected: String,
        /// Observed value.
        actual: String,
    },

    /// Staging, swapping, or committing a component failed.
    #[error("Failed to apply {component} ({phase}): {reason}")]
    Apply {
        /// Component being applied.
        component: Component,
        /// Phase reached when the failure occurred.
        phase: ComponentPhase,
        /// Underlying cause.
        reason: String,
    },

    /// A second update was attempted while one is active.
    #[error("Another update operation is already in progress")]
    ConcurrentOperation,

    /// The caller cancelled the operation before commit started.
    #[error("Update operation was cancelled")]
    Cancelled,

    /// A channel or branch name that is not recognised.
    #[error("Invalid update channel '{value}'")]
    InvalidChannel {
        /// The rejected value.
        value: String,
    },

    /// A downloaded archive could not be read or lacked required entries.
    #[error("Archive error in '{archive}': {reason}")]
    Archive {
        /// Archive file name.
        archive: String,
        /// Underlying cause.
        reason: String,
    },

    /// The installed-state record could not be read or written.
    #[error("Installed state error: {reason}")]
    State {
        /// Underlying cause.
        reason: String,
    },

    /// Local filesystem failure outside the apply state machine.
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for UpdateError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}

impl UpdateError {
    /// Build a transport error from any displayable cause.
    pub fn transport(operation: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Transport {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a not-found error.
    pub fn not_found(subject: impl Into<String>) -> Self {
        Self::NotFound {
            subject: subject.into(),
        }
    }

    /// Build an apply error.
    pub fn apply(component: Component, phase: ComponentPhase, reason: impl fmt::Display) -> Self {
        Self::Apply {
            component,
            phase,
            reason: reason.to_string(),
        }
    }

    /// Whether the failure is transient and worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Short, stable identifier of the error class, used as a log field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound {
                ..
            } => "not_found",
            Self::Transport {
                ..
            } => "transport",
            Self::Integrity {
                ..
            } => "integrity",
            Self::Apply {
                ..
            } => "apply",
            Self::ConcurrentOperation => "concurrent_operation",
            Self::Cancelled => "cancelled",
            Self::InvalidChannel {
                ..
            } => "invalid_channel",
            Self::Archive {
                ..
            } => "archive",
            Self::State {
                ..
            } => "state",
            Self::Io(_) => "io",
        }
    }
}

/// Error wrapper carrying a user-facing suggestion and details.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error.
    pub error: UpdateError,
    /// What the user can do about it.
    pub suggestion: Option<String>,
    /// Extra explanation.
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colours.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into a user-friendly [`ErrorContext`].
///
/// Known [`UpdateError`]s get tailored suggestions; I/O and TOML errors are mapped to
/// the closest class; anything else is reported with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(update_error) = error.downcast_ref::<UpdateError>() {
        return create_error_context(update_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::PermissionDenied {
            return ErrorContext::new(UpdateError::Io(Arc::new(std::io::Error::new(
                io_error.kind(),
                io_error.to_string(),
            ))))
            .with_suggestion(
                "Check that the install directory is writable by the current user, or run with elevated permissions",
            )
            .with_details("ytconv needs write access to its install directory to apply updates");
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(UpdateError::State {
            reason: format!("invalid configuration: {toml_error}"),
        })
        .with_suggestion("Check the TOML syntax of your config file (run 'ytconv config path' to locate it)");
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(UpdateError::State {
        reason: message,
    })
}

fn create_error_context(error: UpdateError) -> ErrorContext {
    match &error {
        UpdateError::NotFound { subject } => ErrorContext::new(error.clone())
            .with_details(format!("The release index has no entry for {subject}"))
            .with_suggestion("Pick another channel with 'ytconv config set update.channel <release|prerelease|nightly>'"),

        UpdateError::Transport { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Check your internet connection and try again. Set GITHUB_TOKEN if you are being rate limited")
            .with_details("All retries were exhausted; nothing on disk was changed"),

        UpdateError::Integrity { asset, .. } => ErrorContext::new(error.clone())
            .with_suggestion("Run the update again so the release is resolved afresh")
            .with_details(format!(
                "The downloaded '{asset}' does not match its published checksum and was discarded. It may have been corrupted or tampered with"
            )),

        UpdateError::Apply { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Run 'ytconv recover' if the previous installation does not start")
            .with_details("Every replaced file was restored from the rollback backup and the installed state was left unchanged"),

        UpdateError::ConcurrentOperation => ErrorContext::new(error.clone())
            .with_suggestion("Wait for the running update to finish before starting another one"),

        UpdateError::InvalidChannel { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Valid channels are: release, prerelease, nightly. Valid yt-dlp branches are: stable, nightly, master"),

        _ => ErrorContext::new(error),
    }
}
