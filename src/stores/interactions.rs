//! Interaction engine
//!
//! Owns the `InteractionState` of every post the viewer has opened and runs
//! each mutation through the same protocol:
//! 1. apply the command locally, synchronously
//! 2. await the Mutation Service
//! 3. success: swap in server records, mark the scope dirty
//! 4. failure: reverse exactly the command's own delta, hand back any text
//!
//! A dirty scope is refetched once the last in-flight mutation on that post
//! settles. A refetch that completes after newer local changes is dropped.
//!
//! Deletes and unshares are not optimistic: local state changes only after
//! the server confirms.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use crate::config::FeedConfig;
use crate::errors::{FeedError, FeedResult, MutationFailure};
use crate::models::{
    Comment, InteractionState, Post, PostId, ReactionRecord, ReactionType, ShareDetails,
    ShareRecord, UserRef,
};
use crate::services::aggregation::{CountsCache, InteractionCounts};
use crate::services::mutation_service::MutationService;
use crate::stores::mutations::{
    is_temp_id, AddComment, AddReply, EditComment, MutationScope, OptimisticMutation, SharePost,
    ToggleReaction,
};
use crate::utils::data_state::DataState;
use crate::utils::validation::validate_comment;

#[derive(Default)]
struct Entry {
    data: DataState<InteractionState>,
    /// Mutations applied locally and still waiting on the server
    pending: usize,
    /// Bumped on every local change; refetches compare it before writing
    revision: u64,
    dirty: HashSet<MutationScope>,
}

/// Authoritative data pulled back for a set of scopes
#[derive(Default)]
struct Refetched {
    reactions: Option<Vec<ReactionRecord>>,
    comments: Option<Vec<Comment>>,
    shares: Option<ShareDetails>,
}

/// Confirmation token for removing a share. Only `request_unshare` builds one,
/// so an unshare always passes through an explicit confirmation step.
#[derive(Debug, Clone, PartialEq)]
pub struct UnshareRequest {
    target_id: PostId,
}

impl UnshareRequest {
    pub fn target_id(&self) -> &str {
        &self.target_id
    }
}

pub struct InteractionEngine<M: MutationService> {
    service: M,
    viewer: UserRef,
    comment_max_len: usize,
    entries: RefCell<HashMap<PostId, Entry>>,
    counts_cache: RefCell<CountsCache>,
    /// Posts shared during this session; the flag never reverts on refetch
    shared_this_session: RefCell<HashSet<PostId>>,
}

impl<M: MutationService> InteractionEngine<M> {
    pub fn new(service: M, viewer: UserRef, config: &FeedConfig) -> Self {
        Self {
            service,
            viewer,
            comment_max_len: config.comment_max_len,
            entries: RefCell::new(HashMap::new()),
            counts_cache: RefCell::new(CountsCache::new(
                config.counts_cache_capacity,
                Duration::from_secs(config.counts_cache_ttl_secs),
            )),
            shared_this_session: RefCell::new(HashSet::new()),
        }
    }

    pub fn service(&self) -> &M {
        &self.service
    }

    pub fn viewer(&self) -> &UserRef {
        &self.viewer
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Snapshot of the loaded state for a target post
    pub fn state(&self, target_id: &str) -> Option<InteractionState> {
        self.entries
            .borrow()
            .get(target_id)
            .and_then(|e| e.data.data().cloned())
    }

    /// Load state without the data (Pending when never requested)
    pub fn load_state(&self, target_id: &str) -> DataState<()> {
        self.entries
            .borrow()
            .get(target_id)
            .map(|e| match &e.data {
                DataState::Pending => DataState::Pending,
                DataState::Loading => DataState::Loading,
                DataState::Loaded(_) => DataState::Loaded(()),
                DataState::Error(err) => DataState::Error(err.clone()),
            })
            .unwrap_or_default()
    }

    pub fn is_loaded(&self, target_id: &str) -> bool {
        self.load_state(target_id).is_loaded()
    }

    /// Number of mutations on this post still waiting for the server
    pub fn pending_mutations(&self, target_id: &str) -> usize {
        self.entries
            .borrow()
            .get(target_id)
            .map(|e| e.pending)
            .unwrap_or(0)
    }

    /// Counts for a card: loaded state first, then the cache, then the post
    pub fn counts(&self, post: &Post) -> InteractionCounts {
        let target_id = post.target_id();
        let mut counts = if let Some(state) = self.state(target_id) {
            InteractionCounts::from_state(&state)
        } else if let Some(cached) = self.counts_cache.borrow_mut().get(target_id) {
            cached
        } else {
            InteractionCounts::from_post(post)
        };
        if self.shared_this_session.borrow().contains(target_id) {
            counts.user_shared = true;
        }
        counts
    }

    /// Whether the share action is available for this post
    pub fn can_share(&self, post: &Post) -> bool {
        self.share_blocker(post).is_none()
    }

    fn has_shared(&self, post: &Post) -> bool {
        let target = post.target();
        target.has_user_shared
            || self.shared_this_session.borrow().contains(&target.id)
            || self
                .entries
                .borrow()
                .get(&target.id)
                .and_then(|e| e.data.data())
                .map(|s| s.share_details.has_user_shared)
                .unwrap_or(false)
    }

    fn share_blocker(&self, post: &Post) -> Option<FeedError> {
        if post.target().is_authored_by(&self.viewer.id) {
            return Some(FeedError::Conflict(
                "You cannot share your own post".to_string(),
            ));
        }
        if self.has_shared(post) {
            return Some(FeedError::Conflict(
                "You already shared this post".to_string(),
            ));
        }
        None
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Fetch reactions, comments and shares for the post's target.
    ///
    /// A no-op once loaded. Two overlapping loads both fetch; whichever lands
    /// first is kept so a loaded (and possibly optimistically changed) state
    /// is never overwritten.
    pub async fn load(&self, post: &Post) -> FeedResult<()> {
        let target_id = post.target_id().to_string();
        {
            let mut entries = self.entries.borrow_mut();
            let entry = entries.entry(target_id.clone()).or_default();
            if entry.data.is_loaded() {
                return Ok(());
            }
            entry.data = DataState::Loading;
        }

        log::debug!("Loading interactions for {}", target_id);
        let result = futures::try_join!(
            self.service.get_reactions(&target_id),
            self.service.get_comments(&target_id),
            self.service.get_shares(&target_id),
        );

        let mut entries = self.entries.borrow_mut();
        let Some(entry) = entries.get_mut(&target_id) else {
            // Released while loading
            return Ok(());
        };
        if entry.data.is_loaded() {
            return Ok(());
        }
        match result {
            Ok((reactions, comments, mut shares)) => {
                if self.shared_this_session.borrow().contains(&target_id) {
                    shares.has_user_shared = true;
                }
                let state =
                    InteractionState::from_parts(&self.viewer.id, reactions, comments, shares);
                self.counts_cache
                    .borrow_mut()
                    .insert(target_id.clone(), InteractionCounts::from_state(&state));
                entry.data = DataState::Loaded(state);
                Ok(())
            }
            Err(error) => {
                log::warn!("Failed to load interactions for {}: {}", target_id, error);
                entry.data = DataState::Error(error.clone());
                Err(error)
            }
        }
    }

    /// Drop a post's state when its card leaves the window, keeping its counts.
    /// Posts with mutations in flight are kept so they can still roll back.
    pub fn release(&self, target_id: &str) -> bool {
        let mut entries = self.entries.borrow_mut();
        let releasable = entries
            .get(target_id)
            .map(|e| e.pending == 0)
            .unwrap_or(false);
        if !releasable {
            return false;
        }
        if let Some(entry) = entries.remove(target_id) {
            if let DataState::Loaded(state) = entry.data {
                self.counts_cache
                    .borrow_mut()
                    .insert(target_id.to_string(), InteractionCounts::from_state(&state));
            }
        }
        true
    }

    /// Drop cached counts after the post record itself was refreshed
    pub fn invalidate_counts(&self, target_id: &str) {
        self.counts_cache.borrow_mut().invalidate(target_id);
    }

    /// Forget a deleted post entirely
    pub fn forget(&self, target_id: &str) {
        self.entries.borrow_mut().remove(target_id);
        self.counts_cache.borrow_mut().invalidate(target_id);
    }

    // ------------------------------------------------------------------------
    // Optimistic mutations
    // ------------------------------------------------------------------------

    /// Toggle the viewer's default reaction
    pub async fn toggle_reaction(&self, post: &Post) -> Result<(), MutationFailure> {
        self.react(post, ReactionType::default()).await
    }

    /// Toggle a reaction of the given type. A second call while the first is
    /// in flight toggles the already-applied state, so it undoes the first.
    pub async fn react(
        &self,
        post: &Post,
        reaction_type: ReactionType,
    ) -> Result<(), MutationFailure> {
        let command = ToggleReaction::new(self.viewer.clone(), reaction_type);
        let call = self.service.add_reaction(post.target_id(), reaction_type);
        self.run_optimistic(post, command, call).await.map(|_| ())
    }

    pub async fn add_comment(&self, post: &Post, text: &str) -> Result<Comment, MutationFailure> {
        let text = match validate_comment(text, self.comment_max_len) {
            Ok(text) => text,
            Err(issue) => return Err(MutationFailure::with_text(issue.into(), text)),
        };
        let command = AddComment::new(self.viewer.clone(), text);
        let call = self.service.add_comment(post.target_id(), text);
        self.run_optimistic(post, command, call).await
    }

    /// Reply to a comment. A parent deleted on the server fails with
    /// `NotFound` and the comments are refetched.
    pub async fn add_reply(
        &self,
        post: &Post,
        parent_id: &str,
        text: &str,
    ) -> Result<Comment, MutationFailure> {
        let text = match validate_comment(text, self.comment_max_len) {
            Ok(text) => text,
            Err(issue) => return Err(MutationFailure::with_text(issue.into(), text)),
        };
        if is_temp_id(parent_id) {
            return Err(MutationFailure::with_text(
                FeedError::InvalidInput("Comment is still being posted".to_string()),
                text,
            ));
        }
        let command = AddReply::new(parent_id, self.viewer.clone(), text);
        let call = self.service.add_reply(parent_id, text);
        self.run_optimistic(post, command, call).await
    }

    pub async fn edit_comment(
        &self,
        post: &Post,
        comment_id: &str,
        text: &str,
    ) -> Result<Comment, MutationFailure> {
        let text = match validate_comment(text, self.comment_max_len) {
            Ok(text) => text,
            Err(issue) => return Err(MutationFailure::with_text(issue.into(), text)),
        };
        if is_temp_id(comment_id) {
            return Err(MutationFailure::with_text(
                FeedError::InvalidInput("Comment is still being posted".to_string()),
                text,
            ));
        }
        let command = EditComment::new(comment_id, text);
        let call = self.service.edit_comment(comment_id, text);
        self.run_optimistic(post, command, call).await
    }

    pub async fn share(&self, post: &Post) -> Result<ShareRecord, MutationFailure> {
        if let Some(blocker) = self.share_blocker(post) {
            return Err(MutationFailure::new(blocker));
        }
        let target_id = post.target_id().to_string();
        let command = SharePost::new(self.viewer.clone());
        let call = self.service.share_post(&target_id);
        let record = self.run_optimistic(post, command, call).await?;
        self.shared_this_session.borrow_mut().insert(target_id.clone());
        log::info!("Shared post {}", target_id);
        Ok(record)
    }

    // ------------------------------------------------------------------------
    // Confirmed (non-optimistic) mutations
    // ------------------------------------------------------------------------

    /// Delete a comment or reply; it leaves local state only once the server
    /// has deleted it.
    pub async fn delete_comment(
        &self,
        post: &Post,
        comment_id: &str,
    ) -> Result<(), MutationFailure> {
        if is_temp_id(comment_id) {
            return Err(FeedError::InvalidInput("Comment is still being posted".to_string()).into());
        }
        let target_id = post.target_id();
        if let Err(error) = self.service.delete_comment(comment_id).await {
            log::warn!("Failed to delete comment {}: {}", comment_id, error);
            return Err(error.into());
        }
        if let Some(entry) = self.entries.borrow_mut().get_mut(target_id) {
            if let Some(state) = entry.data.data_mut() {
                state.remove_comment(comment_id);
            }
            entry.revision += 1;
        }
        self.counts_cache.borrow_mut().invalidate(target_id);
        Ok(())
    }

    /// First step of removing a share: fails unless the viewer has shared
    pub fn request_unshare(&self, post: &Post) -> FeedResult<UnshareRequest> {
        if !self.has_shared(post) {
            return Err(FeedError::Conflict(
                "You have not shared this post".to_string(),
            ));
        }
        Ok(UnshareRequest {
            target_id: post.target_id().to_string(),
        })
    }

    /// Remove the viewer's share after explicit confirmation. Local state is
    /// untouched until the server confirms; shares are then refetched.
    pub async fn confirm_unshare(&self, request: UnshareRequest) -> Result<(), MutationFailure> {
        let target_id = request.target_id;
        if let Err(error) = self.service.unshare_post(&target_id).await {
            log::warn!("Failed to unshare {}: {}", target_id, error);
            return Err(error.into());
        }
        log::info!("Unshared post {}", target_id);
        self.shared_this_session.borrow_mut().remove(&target_id);

        let reconcile = match self.entries.borrow_mut().get_mut(&target_id) {
            Some(entry) => {
                if let Some(state) = entry.data.data_mut() {
                    let details = &mut state.share_details;
                    let before = details.shares.len();
                    details.shares.retain(|s| s.user.id != self.viewer.id);
                    if details.shares.len() < before {
                        details.total_shares = details.total_shares.saturating_sub(1);
                    }
                    details.has_user_shared = false;
                }
                entry.revision += 1;
                entry.dirty.insert(MutationScope::Shares);
                entry.pending == 0 && entry.data.is_loaded()
            }
            None => false,
        };
        self.counts_cache.borrow_mut().invalidate(&target_id);
        if reconcile {
            self.reconcile(&target_id).await;
        }
        Ok(())
    }

    /// Delete one of the viewer's posts on the server, then drop its state.
    pub async fn delete_post(&self, post: &Post) -> FeedResult<()> {
        if !post.is_authored_by(&self.viewer.id) {
            return Err(FeedError::Conflict(
                "You can only delete your own posts".to_string(),
            ));
        }
        self.service.delete_post(&post.id).await?;
        self.forget(&post.id);
        log::info!("Deleted post {}", post.id);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Protocol
    // ------------------------------------------------------------------------

    async fn run_optimistic<C, F>(
        &self,
        post: &Post,
        mut command: C,
        call: F,
    ) -> Result<C::Output, MutationFailure>
    where
        C: OptimisticMutation,
        F: Future<Output = FeedResult<C::Output>>,
    {
        let target_id = post.target_id().to_string();
        if let Err(error) = self.load(post).await {
            return Err(Self::failure(&command, error));
        }

        // No suspension point between the load check and apply
        {
            let mut entries = self.entries.borrow_mut();
            let entry = match entries.get_mut(&target_id) {
                Some(entry) => entry,
                None => return Err(Self::failure(&command, FeedError::Cancelled)),
            };
            let Some(state) = entry.data.data_mut() else {
                return Err(Self::failure(&command, FeedError::Cancelled));
            };
            if let Err(error) = command.precondition(state) {
                log::debug!("Rejected {} on {}: {}", command.label(), target_id, error);
                return Err(Self::failure(&command, error));
            }
            command.apply(state);
            entry.pending += 1;
            entry.revision += 1;
        }
        log::debug!("Applied optimistic {} on {}", command.label(), target_id);

        let result = call.await;

        let needs_reconcile = {
            let mut entries = self.entries.borrow_mut();
            match entries.get_mut(&target_id) {
                Some(entry) => {
                    entry.pending = entry.pending.saturating_sub(1);
                    entry.revision += 1;
                    match (&result, entry.data.data_mut()) {
                        (Ok(output), Some(state)) => {
                            command.confirm(state, output);
                            entry.dirty.insert(command.scope());
                        }
                        (Err(error), Some(state)) => {
                            command.reverse(state, error);
                            // The server disagrees with what we hold; look again
                            if error.is_conflict() {
                                entry.dirty.insert(command.scope());
                            }
                        }
                        _ => {}
                    }
                    entry.pending == 0 && !entry.dirty.is_empty()
                }
                None => false,
            }
        };
        self.counts_cache.borrow_mut().invalidate(&target_id);

        if needs_reconcile {
            self.reconcile(&target_id).await;
        }

        match result {
            Ok(output) => Ok(output),
            Err(error) => {
                log::warn!(
                    "Rolled back {} on {}: {}",
                    command.label(),
                    target_id,
                    error
                );
                Err(Self::failure(&command, error))
            }
        }
    }

    fn failure<C: OptimisticMutation>(command: &C, error: FeedError) -> MutationFailure {
        MutationFailure {
            error,
            restored_text: command.restore_text(),
        }
    }

    /// Refetch dirty scopes. Runs only with no mutation in flight; a result
    /// that lands after a newer local change is discarded and retried.
    async fn reconcile(&self, target_id: &str) {
        loop {
            let (scopes, revision) = {
                let mut entries = self.entries.borrow_mut();
                let Some(entry) = entries.get_mut(target_id) else {
                    return;
                };
                if entry.pending > 0 || entry.dirty.is_empty() {
                    return;
                }
                (std::mem::take(&mut entry.dirty), entry.revision)
            };

            let fetched = self.refetch(target_id, &scopes).await;

            let mut entries = self.entries.borrow_mut();
            let Some(entry) = entries.get_mut(target_id) else {
                return;
            };
            if entry.pending > 0 {
                // The last mutation to settle reconciles again
                entry.dirty.extend(scopes);
                return;
            }
            if entry.revision != revision {
                log::debug!("Discarding stale refetch for {}", target_id);
                entry.dirty.extend(scopes);
                continue;
            }
            let fetched = match fetched {
                Ok(fetched) => fetched,
                Err(error) => {
                    log::warn!("Failed to reconcile {}: {}", target_id, error);
                    entry.dirty.extend(scopes);
                    return;
                }
            };
            if let Some(state) = entry.data.data_mut() {
                if let Some(reactions) = fetched.reactions {
                    state.replace_reactions(&self.viewer.id, reactions);
                }
                if let Some(comments) = fetched.comments {
                    state.comments = comments;
                }
                if let Some(mut shares) = fetched.shares {
                    if self.shared_this_session.borrow().contains(target_id) {
                        shares.has_user_shared = true;
                    }
                    state.share_details = shares;
                }
            }
            entry.revision += 1;
            drop(entries);
            self.counts_cache.borrow_mut().invalidate(target_id);
            log::debug!("Reconciled {:?} for {}", scopes, target_id);
            return;
        }
    }

    async fn refetch(
        &self,
        target_id: &str,
        scopes: &HashSet<MutationScope>,
    ) -> FeedResult<Refetched> {
        let mut fetched = Refetched::default();
        if scopes.contains(&MutationScope::Reactions) {
            fetched.reactions = Some(self.service.get_reactions(target_id).await?);
        }
        if scopes.contains(&MutationScope::Comments) {
            fetched.comments = Some(self.service.get_comments(target_id).await?);
        }
        if scopes.contains(&MutationScope::Shares) {
            fetched.shares = Some(self.service.get_shares(target_id).await?);
        }
        Ok(fetched)
    }
}
