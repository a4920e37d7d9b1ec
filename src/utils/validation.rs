//! Comment composer validation.
//!
//! `validate_comment` is the check the interaction engine runs before any
//! network call. `CommentDraft` wraps the composer text and re-runs the same
//! check through a `Debouncer` while the user types.

use std::cell::RefCell;
use std::fmt;
use std::time::Duration;

use crate::errors::FeedError;
use crate::utils::debounce::Debouncer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftIssue {
    /// Nothing but whitespace
    Empty,
    TooLong { len: usize, max: usize },
}

impl fmt::Display for DraftIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Comment cannot be empty"),
            Self::TooLong { len, max } => {
                write!(f, "Comment is too long ({} of {} characters)", len, max)
            }
        }
    }
}

impl From<DraftIssue> for FeedError {
    fn from(issue: DraftIssue) -> Self {
        FeedError::InvalidInput(issue.to_string())
    }
}

/// Check composer text; returns the trimmed text to send.
///
/// Length counts characters, not bytes.
pub fn validate_comment(text: &str, max_len: usize) -> Result<&str, DraftIssue> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DraftIssue::Empty);
    }
    let len = trimmed.chars().count();
    if len > max_len {
        return Err(DraftIssue::TooLong { len, max: max_len });
    }
    Ok(trimmed)
}

/// Composer text plus its last validation result
pub struct CommentDraft {
    text: RefCell<String>,
    issue: RefCell<Option<DraftIssue>>,
    max_len: usize,
    debouncer: Debouncer,
}

impl CommentDraft {
    pub fn new(max_len: usize, delay: Duration) -> Self {
        Self {
            text: RefCell::new(String::new()),
            issue: RefCell::new(None),
            max_len,
            debouncer: Debouncer::new(delay),
        }
    }

    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }

    /// Issue found by the last validation that ran (None while clean)
    pub fn issue(&self) -> Option<DraftIssue> {
        self.issue.borrow().clone()
    }

    /// Record a keystroke and validate once typing pauses.
    /// Returns false when a later keystroke superseded this one.
    pub async fn input(&self, text: impl Into<String>) -> bool {
        *self.text.borrow_mut() = text.into();
        self.debouncer
            .run(|| self.revalidate())
            .await
            .is_some()
    }

    /// Validate right away (submit button)
    pub fn revalidate(&self) {
        let issue = validate_comment(&self.text.borrow(), self.max_len).err();
        *self.issue.borrow_mut() = issue;
    }

    pub fn can_submit(&self) -> bool {
        validate_comment(&self.text.borrow(), self.max_len).is_ok()
    }

    /// Clear the composer and hand back the trimmed text to send
    pub fn take(&self) -> Result<String, DraftIssue> {
        self.debouncer.cancel();
        let text = validate_comment(&self.text.borrow(), self.max_len)?.to_string();
        self.text.borrow_mut().clear();
        *self.issue.borrow_mut() = None;
        Ok(text)
    }

    /// Put text back after a failed send
    pub fn restore(&self, text: impl Into<String>) {
        *self.text.borrow_mut() = text.into();
        self.revalidate();
    }
}
