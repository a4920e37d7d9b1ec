/// Load state for lazily fetched data
///
/// One enum instead of separate `is_loading` / `error` / `data` fields, so a
/// post's interactions can only be in one of these states at a time.
use crate::errors::FeedError;

#[derive(Debug, Clone, PartialEq)]
pub enum DataState<T> {
    /// Nothing requested yet
    Pending,

    /// A fetch is in flight
    Loading,

    Loaded(T),

    /// The last fetch failed; the next access fetches again
    Error(FeedError),
}

impl<T> DataState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, DataState::Pending)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, DataState::Loading)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, DataState::Loaded(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, DataState::Error(_))
    }

    /// Returns the data if loaded, None otherwise
    pub fn data(&self) -> Option<&T> {
        match self {
            DataState::Loaded(data) => Some(data),
            _ => None,
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut T> {
        match self {
            DataState::Loaded(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FeedError> {
        match self {
            DataState::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Maps the data using a function if in Loaded state
    pub fn map<U, F>(self, f: F) -> DataState<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            DataState::Pending => DataState::Pending,
            DataState::Loading => DataState::Loading,
            DataState::Loaded(data) => DataState::Loaded(f(data)),
            DataState::Error(err) => DataState::Error(err),
        }
    }
}

impl<T> Default for DataState<T> {
    fn default() -> Self {
        DataState::Pending
    }
}

impl<T> From<Result<T, FeedError>> for DataState<T> {
    fn from(result: Result<T, FeedError>) -> Self {
        match result {
            Ok(data) => DataState::Loaded(data),
            Err(err) => DataState::Error(err),
        }
    }
}
