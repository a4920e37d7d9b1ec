//! Feed engine error types
//!
//! Every call that crosses into the Feed Data Source or the Mutation Service
//! returns a typed result. Nothing here is fatal: the worst outcome is a feed
//! that needs a manual refresh.

use std::fmt;

/// Feed engine error type
#[derive(Debug, Clone, PartialEq)]
pub enum FeedError {
    // ==========================================================================
    // Dependency Errors
    // ==========================================================================
    /// Network or server failure reaching a dependency (retryable)
    Transport(String),
    /// The request contradicts current server state (already shared,
    /// replying to a deleted comment). Never retried automatically.
    Conflict(String),
    /// The addressed post or comment does not exist
    NotFound(String),

    // ==========================================================================
    // Local Errors
    // ==========================================================================
    /// The operation was superseded (feed reset, retry) before it settled
    Cancelled,
    /// Seen-store backend read/write failure. Logged, never shown to the user.
    Persistence(String),
    /// Stored or received JSON could not be (de)serialized
    Serialization(String),
    /// Rejected before reaching the network (empty comment, bad config)
    InvalidInput(String),
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "Network error: {}", msg),
            Self::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Self::NotFound(what) => write!(f, "Not found: {}", what),
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::Persistence(msg) => write!(f, "Storage error: {}", msg),
            Self::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for FeedError {}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for feed engine operations
pub type FeedResult<T> = Result<T, FeedError>;

impl FeedError {
    /// Transient failures the user may retry right away
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Cancelled)
    }

    /// Explanatory failures that must not be retried automatically
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::NotFound(_))
    }

    /// Whether the error should reach the user at all
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::Persistence(_) | Self::Cancelled)
    }

    /// Message suitable for a toast
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(_) => "Something went wrong. Please try again.".to_string(),
            Self::Conflict(msg) => msg.clone(),
            Self::NotFound(_) => "This content is no longer available.".to_string(),
            Self::InvalidInput(msg) => msg.clone(),
            Self::Cancelled | Self::Persistence(_) | Self::Serialization(_) => String::new(),
        }
    }

    /// Map a human-readable transport message into the taxonomy
    pub fn from_string(s: impl Into<String>) -> Self {
        let msg = s.into();
        let lower = msg.to_lowercase();

        if lower.contains("already shared") || lower.contains("conflict") {
            return Self::Conflict(msg);
        }
        if lower.contains("not found") || lower.contains("deleted") || lower.contains("404") {
            return Self::NotFound(msg);
        }
        if lower.contains("cancelled") || lower.contains("aborted") {
            return Self::Cancelled;
        }

        Self::Transport(msg)
    }
}

/// A failed mutation, carrying whatever the user typed so the composer can be
/// refilled after the optimistic entry is rolled back.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationFailure {
    pub error: FeedError,
    pub restored_text: Option<String>,
}

impl MutationFailure {
    pub fn new(error: FeedError) -> Self {
        Self {
            error,
            restored_text: None,
        }
    }

    pub fn with_text(error: FeedError, text: impl Into<String>) -> Self {
        Self {
            error,
            restored_text: Some(text.into()),
        }
    }
}

impl fmt::Display for MutationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for MutationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<FeedError> for MutationFailure {
    fn from(error: FeedError) -> Self {
        Self::new(error)
    }
}
