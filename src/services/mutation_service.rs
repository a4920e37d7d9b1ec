//! Mutation Service contract
//!
//! Server-side interactions. Every call returns a typed result carrying a
//! human-readable message on failure; nothing here panics or throws.

use async_trait::async_trait;

use crate::errors::FeedResult;
use crate::models::{Comment, ReactionRecord, ReactionType, ShareDetails, ShareRecord};

#[async_trait(?Send)]
pub trait MutationService {
    /// Toggle the viewer's reaction on a post. The server creates the record
    /// when absent and removes it when present; `None` means it was removed.
    async fn add_reaction(
        &self,
        post_id: &str,
        reaction_type: ReactionType,
    ) -> FeedResult<Option<ReactionRecord>>;

    async fn get_reactions(&self, post_id: &str) -> FeedResult<Vec<ReactionRecord>>;

    async fn add_comment(&self, post_id: &str, text: &str) -> FeedResult<Comment>;

    async fn add_reply(&self, comment_id: &str, text: &str) -> FeedResult<Comment>;

    async fn edit_comment(&self, comment_id: &str, text: &str) -> FeedResult<Comment>;

    async fn delete_comment(&self, comment_id: &str) -> FeedResult<()>;

    /// Comments in display order, replies nested under their parent
    async fn get_comments(&self, post_id: &str) -> FeedResult<Vec<Comment>>;

    async fn share_post(&self, post_id: &str) -> FeedResult<ShareRecord>;

    async fn unshare_post(&self, post_id: &str) -> FeedResult<()>;

    async fn get_shares(&self, post_id: &str) -> FeedResult<ShareDetails>;

    async fn delete_post(&self, post_id: &str) -> FeedResult<()>;
}
