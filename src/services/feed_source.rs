//! Feed Data Source contract
//!
//! The transport that performs authenticated HTTP calls lives outside this
//! crate. The engine only sees ordered pages of posts or a typed failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::FeedResult;
use crate::models::Post;

/// An ordered batch of posts for one page index.
///
/// A page shorter than the requested size is the only exhaustion signal;
/// no "has more" flag from the server is trusted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub posts: Vec<Post>,
}

impl Page {
    pub fn new(posts: Vec<Post>) -> Self {
        Self { posts }
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Whether this page ends the sequence for the requested size
    pub fn is_short(&self, page_size: usize) -> bool {
        self.posts.len() < page_size
    }
}

#[async_trait(?Send)]
pub trait FeedDataSource {
    /// Fetch page `page_index` (1-based) of at most `page_size` posts
    async fn get_page(&self, page_index: u32, page_size: usize) -> FeedResult<Page>;

    async fn get_single_post(&self, post_id: &str) -> FeedResult<Post>;
}
