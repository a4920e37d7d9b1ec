pub mod data_state;
pub mod debounce;
pub mod format;
pub mod time;
pub mod validation;

pub use data_state::DataState;
pub use debounce::Debouncer;
pub use format::format_count;
pub use validation::{validate_comment, CommentDraft, DraftIssue};
