//! Optimistic mutation commands
//!
//! Each user interaction is a command object with three transitions over a
//! post's `InteractionState`:
//! - `apply` writes the intended result before the network call is issued
//! - `confirm` swaps temporary records for the server's once it answers
//! - `reverse` undoes exactly what `apply` wrote, and nothing else
//!
//! Commands record their own delta while applying, so two commands applied
//! back to back (a double-tapped like) each undo only their own change.

use chrono::Utc;
use uuid::Uuid;

use crate::errors::FeedError;
use crate::models::{
    Comment, CommentId, InteractionState, ReactionRecord, ReactionType, ShareRecord, UserRef,
};

const TEMP_ID_PREFIX: &str = "temp-";

/// Local id for a record the server has not confirmed yet
pub fn temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4())
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Which part of the state a command touches (and which fetch reconciles it)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationScope {
    Reactions,
    Comments,
    Shares,
}

pub trait OptimisticMutation {
    /// What the Mutation Service returns on success
    type Output;

    fn label(&self) -> &'static str;

    fn scope(&self) -> MutationScope;

    /// Checked against the loaded state right before `apply`; an error
    /// rejects the command without calling the server
    fn precondition(&self, _state: &InteractionState) -> Result<(), FeedError> {
        Ok(())
    }

    fn apply(&mut self, state: &mut InteractionState);

    fn confirm(&self, _state: &mut InteractionState, _output: &Self::Output) {}

    fn reverse(&self, state: &mut InteractionState, failure: &FeedError);

    /// Text to hand back to the composer when the command is rolled back
    fn restore_text(&self) -> Option<String> {
        None
    }
}

fn sync_user_reaction(state: &mut InteractionState, viewer_id: &str) {
    state.user_reaction = state.reactions.get(viewer_id).cloned();
}

// ============================================================================
// Reactions
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
enum ReactionDelta {
    /// Inserted an optimistic record with this temp id
    Added(String),
    /// Removed the viewer's existing record
    Removed(ReactionRecord),
}

/// Toggle the viewer's reaction: remove it if present, else add one
pub struct ToggleReaction {
    viewer: UserRef,
    reaction_type: ReactionType,
    delta: Option<ReactionDelta>,
}

impl ToggleReaction {
    pub fn new(viewer: UserRef, reaction_type: ReactionType) -> Self {
        Self {
            viewer,
            reaction_type,
            delta: None,
        }
    }

    /// Whether applying this toggle added a reaction (false once it removed one)
    pub fn added(&self) -> bool {
        matches!(self.delta, Some(ReactionDelta::Added(_)))
    }
}

impl OptimisticMutation for ToggleReaction {
    /// The created record, or None when the server removed the reaction
    type Output = Option<ReactionRecord>;

    fn label(&self) -> &'static str {
        "reaction"
    }

    fn scope(&self) -> MutationScope {
        MutationScope::Reactions
    }

    fn apply(&mut self, state: &mut InteractionState) {
        // Reads the current, possibly already optimistic, record for the viewer
        let delta = match state.reactions.remove(&self.viewer.id) {
            Some(existing) => ReactionDelta::Removed(existing),
            None => {
                let record = ReactionRecord {
                    id: temp_id(),
                    user: self.viewer.clone(),
                    reaction_type: self.reaction_type,
                    created_at: Utc::now(),
                    is_optimistic: true,
                };
                let id = record.id.clone();
                state.reactions.insert(self.viewer.id.clone(), record);
                ReactionDelta::Added(id)
            }
        };
        sync_user_reaction(state, &self.viewer.id);
        self.delta = Some(delta);
    }

    fn confirm(&self, state: &mut InteractionState, output: &Self::Output) {
        if let (Some(ReactionDelta::Added(temp)), Some(record)) = (&self.delta, output) {
            if let Some(current) = state.reactions.get_mut(&self.viewer.id) {
                if &current.id == temp {
                    *current = record.clone();
                }
            }
            sync_user_reaction(state, &self.viewer.id);
        }
    }

    fn reverse(&self, state: &mut InteractionState, _failure: &FeedError) {
        match &self.delta {
            Some(ReactionDelta::Added(temp)) => {
                let ours = state
                    .reactions
                    .get(&self.viewer.id)
                    .map(|r| &r.id == temp)
                    .unwrap_or(false);
                if ours {
                    state.reactions.remove(&self.viewer.id);
                }
            }
            Some(ReactionDelta::Removed(previous)) => {
                state
                    .reactions
                    .entry(self.viewer.id.clone())
                    .or_insert_with(|| previous.clone());
            }
            None => return,
        }
        sync_user_reaction(state, &self.viewer.id);
    }
}

// ============================================================================
// Comments
// ============================================================================

fn optimistic_comment(id: &str, author: &UserRef, text: &str) -> Comment {
    Comment {
        id: id.to_string(),
        text: text.to_string(),
        author: author.clone(),
        created_at: Utc::now(),
        replies: Vec::new(),
        is_optimistic: true,
    }
}

fn replace_temp_comment(state: &mut InteractionState, temp: &str, confirmed: &Comment) {
    if let Some(comment) = state.find_comment_mut(temp) {
        let replies = std::mem::take(&mut comment.replies);
        *comment = confirmed.clone();
        comment.replies.extend(replies);
    }
}

/// Append a top-level comment
pub struct AddComment {
    author: UserRef,
    text: String,
    temp_id: String,
}

impl AddComment {
    pub fn new(author: UserRef, text: impl Into<String>) -> Self {
        Self {
            author,
            text: text.into(),
            temp_id: temp_id(),
        }
    }

    pub fn temp_id(&self) -> &str {
        &self.temp_id
    }
}

impl OptimisticMutation for AddComment {
    type Output = Comment;

    fn label(&self) -> &'static str {
        "comment"
    }

    fn scope(&self) -> MutationScope {
        MutationScope::Comments
    }

    fn apply(&mut self, state: &mut InteractionState) {
        state
            .comments
            .push(optimistic_comment(&self.temp_id, &self.author, &self.text));
    }

    fn confirm(&self, state: &mut InteractionState, output: &Comment) {
        replace_temp_comment(state, &self.temp_id, output);
    }

    fn reverse(&self, state: &mut InteractionState, _failure: &FeedError) {
        state.remove_comment(&self.temp_id);
    }

    fn restore_text(&self) -> Option<String> {
        Some(self.text.clone())
    }
}

/// Append a reply under an existing comment.
///
/// The parent may be gone locally by the time this applies; the command then
/// writes nothing and still lets the server decide.
pub struct AddReply {
    parent_id: CommentId,
    author: UserRef,
    text: String,
    temp_id: String,
    applied: bool,
}

impl AddReply {
    pub fn new(parent_id: impl Into<String>, author: UserRef, text: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            author,
            text: text.into(),
            temp_id: temp_id(),
            applied: false,
        }
    }

    pub fn temp_id(&self) -> &str {
        &self.temp_id
    }
}

impl OptimisticMutation for AddReply {
    type Output = Comment;

    fn label(&self) -> &'static str {
        "reply"
    }

    fn scope(&self) -> MutationScope {
        MutationScope::Comments
    }

    fn apply(&mut self, state: &mut InteractionState) {
        if let Some(parent) = state.find_comment_mut(&self.parent_id) {
            parent
                .replies
                .push(optimistic_comment(&self.temp_id, &self.author, &self.text));
            self.applied = true;
        }
    }

    fn confirm(&self, state: &mut InteractionState, output: &Comment) {
        replace_temp_comment(state, &self.temp_id, output);
    }

    fn reverse(&self, state: &mut InteractionState, _failure: &FeedError) {
        if self.applied {
            state.remove_comment(&self.temp_id);
        }
    }

    fn restore_text(&self) -> Option<String> {
        Some(self.text.clone())
    }
}

/// Replace a confirmed comment's text
pub struct EditComment {
    comment_id: CommentId,
    text: String,
    previous: Option<String>,
}

impl EditComment {
    pub fn new(comment_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            comment_id: comment_id.into(),
            text: text.into(),
            previous: None,
        }
    }
}

impl OptimisticMutation for EditComment {
    type Output = Comment;

    fn label(&self) -> &'static str {
        "comment edit"
    }

    fn scope(&self) -> MutationScope {
        MutationScope::Comments
    }

    fn apply(&mut self, state: &mut InteractionState) {
        if let Some(comment) = state.find_comment_mut(&self.comment_id) {
            self.previous = Some(std::mem::replace(&mut comment.text, self.text.clone()));
        }
    }

    fn confirm(&self, state: &mut InteractionState, output: &Comment) {
        if let Some(comment) = state.find_comment_mut(&self.comment_id) {
            comment.text = output.text.clone();
        }
    }

    fn reverse(&self, state: &mut InteractionState, _failure: &FeedError) {
        if let (Some(previous), Some(comment)) =
            (&self.previous, state.find_comment_mut(&self.comment_id))
        {
            comment.text = previous.clone();
        }
    }

    fn restore_text(&self) -> Option<String> {
        Some(self.text.clone())
    }
}

// ============================================================================
// Shares
// ============================================================================

/// Share the target post on the viewer's behalf
pub struct SharePost {
    viewer: UserRef,
    temp_id: String,
    previously_shared: bool,
}

impl SharePost {
    pub fn new(viewer: UserRef) -> Self {
        Self {
            viewer,
            temp_id: temp_id(),
            previously_shared: false,
        }
    }
}

impl OptimisticMutation for SharePost {
    type Output = ShareRecord;

    fn label(&self) -> &'static str {
        "share"
    }

    fn scope(&self) -> MutationScope {
        MutationScope::Shares
    }

    fn precondition(&self, state: &InteractionState) -> Result<(), FeedError> {
        if state.share_details.has_user_shared {
            return Err(FeedError::Conflict(
                "You already shared this post".to_string(),
            ));
        }
        Ok(())
    }

    fn apply(&mut self, state: &mut InteractionState) {
        let details = &mut state.share_details;
        self.previously_shared = details.has_user_shared;
        details.shares.push(ShareRecord {
            id: self.temp_id.clone(),
            user: self.viewer.clone(),
            shared_at: Utc::now(),
            is_optimistic: true,
        });
        details.total_shares += 1;
        details.has_user_shared = true;
    }

    fn confirm(&self, state: &mut InteractionState, output: &ShareRecord) {
        if let Some(record) = state
            .share_details
            .shares
            .iter_mut()
            .find(|s| s.id == self.temp_id)
        {
            *record = output.clone();
        }
    }

    fn reverse(&self, state: &mut InteractionState, _failure: &FeedError) {
        let details = &mut state.share_details;
        let before = details.shares.len();
        details.shares.retain(|s| s.id != self.temp_id);
        if details.shares.len() < before {
            details.total_shares = details.total_shares.saturating_sub(1);
        }
        details.has_user_shared = self.previously_shared;
    }
}
