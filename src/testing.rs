//! In-memory stand-ins for the feed transport and the mutation backend.
//!
//! Any call can be held open with `hold`, which returns the sender that
//! releases it. That is how tests interleave a second operation with one that
//! is still waiting on the network.

use async_trait::async_trait;
use futures::channel::oneshot;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::errors::{FeedError, FeedResult};
use crate::models::fixtures::{post, ts};
use crate::models::{Comment, Post, ReactionRecord, ReactionType, ShareDetails, ShareRecord, UserRef};
use crate::services::feed_source::{FeedDataSource, Page};
use crate::services::mutation_service::MutationService;

#[derive(Default)]
struct Gates {
    held: RefCell<HashMap<String, VecDeque<oneshot::Receiver<()>>>>,
    failures: RefCell<HashMap<String, VecDeque<FeedError>>>,
    calls: RefCell<Vec<String>>,
}

impl Gates {
    fn hold(&self, op: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.held
            .borrow_mut()
            .entry(op.to_string())
            .or_default()
            .push_back(rx);
        tx
    }

    fn fail_next(&self, op: &str, error: FeedError) {
        self.failures
            .borrow_mut()
            .entry(op.to_string())
            .or_default()
            .push_back(error);
    }

    async fn checkpoint(&self, op: &str) -> FeedResult<()> {
        self.calls.borrow_mut().push(op.to_string());
        let gate = self.held.borrow_mut().get_mut(op).and_then(VecDeque::pop_front);
        if let Some(rx) = gate {
            let _ = rx.await;
        }
        match self.failures.borrow_mut().get_mut(op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn count(&self, op: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.as_str() == op).count()
    }
}

/// Feed source serving `page_lens[n - 1]` posts for page `n`
pub struct MockFeedSource {
    page_lens: Vec<usize>,
    gates: Gates,
    singles: RefCell<HashMap<String, Post>>,
}

impl MockFeedSource {
    pub fn new(page_lens: Vec<usize>) -> Self {
        Self {
            page_lens,
            gates: Gates::default(),
            singles: RefCell::new(HashMap::new()),
        }
    }

    pub fn page_op(page: u32) -> String {
        format!("page-{}", page)
    }

    pub fn post_id(page: u32, i: usize) -> String {
        format!("p{}-{}", page, i)
    }

    pub fn hold_page(&self, page: u32) -> oneshot::Sender<()> {
        self.gates.hold(&Self::page_op(page))
    }

    pub fn fail_page(&self, page: u32, error: FeedError) {
        self.gates.fail_next(&Self::page_op(page), error);
    }

    pub fn page_calls(&self, page: u32) -> usize {
        self.gates.count(&Self::page_op(page))
    }

    pub fn total_page_calls(&self) -> usize {
        self.gates
            .calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with("page-"))
            .count()
    }

    pub fn set_single(&self, post: Post) {
        self.singles.borrow_mut().insert(post.id.clone(), post);
    }
}

#[async_trait(?Send)]
impl FeedDataSource for MockFeedSource {
    async fn get_page(&self, page_index: u32, page_size: usize) -> FeedResult<Page> {
        self.gates.checkpoint(&Self::page_op(page_index)).await?;
        let len = self
            .page_lens
            .get(page_index as usize - 1)
            .copied()
            .unwrap_or(0)
            .min(page_size);
        Ok(Page::new(
            (0..len)
                .map(|i| post(&Self::post_id(page_index, i), "author"))
                .collect(),
        ))
    }

    async fn get_single_post(&self, post_id: &str) -> FeedResult<Post> {
        self.gates.checkpoint("single").await?;
        self.singles
            .borrow()
            .get(post_id)
            .cloned()
            .ok_or_else(|| FeedError::NotFound(format!("post {}", post_id)))
    }
}

/// Mutation backend keeping its own authoritative copy of every interaction
pub struct MockMutationService {
    viewer: UserRef,
    gates: Gates,
    next_id: Cell<u64>,
    reactions: RefCell<HashMap<String, Vec<ReactionRecord>>>,
    comments: RefCell<HashMap<String, Vec<Comment>>>,
    shares: RefCell<HashMap<String, Vec<ShareRecord>>>,
    deleted_posts: RefCell<HashSet<String>>,
}

impl MockMutationService {
    pub fn new(viewer: UserRef) -> Self {
        Self {
            viewer,
            gates: Gates::default(),
            next_id: Cell::new(0),
            reactions: RefCell::new(HashMap::new()),
            comments: RefCell::new(HashMap::new()),
            shares: RefCell::new(HashMap::new()),
            deleted_posts: RefCell::new(HashSet::new()),
        }
    }

    pub fn hold(&self, op: &str) -> oneshot::Sender<()> {
        self.gates.hold(op)
    }

    pub fn fail_next(&self, op: &str, error: FeedError) {
        self.gates.fail_next(op, error);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.gates.count(op)
    }

    pub fn seed_reactions(&self, post_id: &str, records: Vec<ReactionRecord>) {
        self.reactions.borrow_mut().insert(post_id.to_string(), records);
    }

    pub fn seed_comments(&self, post_id: &str, comments: Vec<Comment>) {
        self.comments.borrow_mut().insert(post_id.to_string(), comments);
    }

    pub fn seed_shares(&self, post_id: &str, records: Vec<ShareRecord>) {
        self.shares.borrow_mut().insert(post_id.to_string(), records);
    }

    /// Drop a comment behind the client's back
    pub fn remove_comment_remotely(&self, comment_id: &str) {
        for list in self.comments.borrow_mut().values_mut() {
            list.retain(|c| c.id != comment_id);
        }
    }

    pub fn is_post_deleted(&self, post_id: &str) -> bool {
        self.deleted_posts.borrow().contains(post_id)
    }

    fn fresh_id(&self) -> String {
        self.next_id.set(self.next_id.get() + 1);
        format!("srv-{}", self.next_id.get())
    }

    fn with_comment<T>(&self, comment_id: &str, f: impl FnOnce(&mut Comment) -> T) -> FeedResult<T> {
        fn walk<'a>(list: &'a mut [Comment], id: &str) -> Option<&'a mut Comment> {
            for comment in list.iter_mut() {
                if comment.id == id {
                    return Some(comment);
                }
                if let Some(found) = walk(&mut comment.replies, id) {
                    return Some(found);
                }
            }
            None
        }

        let mut comments = self.comments.borrow_mut();
        comments
            .values_mut()
            .find_map(|list| walk(list, comment_id))
            .map(f)
            .ok_or_else(|| FeedError::NotFound("Comment not found".to_string()))
    }
}

#[async_trait(?Send)]
impl MutationService for MockMutationService {
    async fn add_reaction(
        &self,
        post_id: &str,
        reaction_type: ReactionType,
    ) -> FeedResult<Option<ReactionRecord>> {
        self.gates.checkpoint("add_reaction").await?;
        let mut reactions = self.reactions.borrow_mut();
        let list = reactions.entry(post_id.to_string()).or_default();
        if let Some(pos) = list.iter().position(|r| r.user.id == self.viewer.id) {
            list.remove(pos);
            return Ok(None);
        }
        let record = ReactionRecord {
            id: self.fresh_id(),
            user: self.viewer.clone(),
            reaction_type,
            created_at: ts(100),
            is_optimistic: false,
        };
        list.push(record.clone());
        Ok(Some(record))
    }

    async fn get_reactions(&self, post_id: &str) -> FeedResult<Vec<ReactionRecord>> {
        self.gates.checkpoint("get_reactions").await?;
        Ok(self.reactions.borrow().get(post_id).cloned().unwrap_or_default())
    }

    async fn add_comment(&self, post_id: &str, text: &str) -> FeedResult<Comment> {
        self.gates.checkpoint("add_comment").await?;
        let comment = Comment {
            id: self.fresh_id(),
            text: text.to_string(),
            author: self.viewer.clone(),
            created_at: ts(100),
            replies: Vec::new(),
            is_optimistic: false,
        };
        self.comments
            .borrow_mut()
            .entry(post_id.to_string())
            .or_default()
            .push(comment.clone());
        Ok(comment)
    }

    async fn add_reply(&self, comment_id: &str, text: &str) -> FeedResult<Comment> {
        self.gates.checkpoint("add_reply").await?;
        let reply = Comment {
            id: self.fresh_id(),
            text: text.to_string(),
            author: self.viewer.clone(),
            created_at: ts(100),
            replies: Vec::new(),
            is_optimistic: false,
        };
        let stored = reply.clone();
        self.with_comment(comment_id, move |parent| parent.replies.push(stored))?;
        Ok(reply)
    }

    async fn edit_comment(&self, comment_id: &str, text: &str) -> FeedResult<Comment> {
        self.gates.checkpoint("edit_comment").await?;
        self.with_comment(comment_id, |comment| {
            comment.text = text.to_string();
            comment.clone()
        })
    }

    async fn delete_comment(&self, comment_id: &str) -> FeedResult<()> {
        self.gates.checkpoint("delete_comment").await?;
        fn walk(list: &mut Vec<Comment>, id: &str) -> bool {
            if let Some(pos) = list.iter().position(|c| c.id == id) {
                list.remove(pos);
                return true;
            }
            list.iter_mut().any(|c| walk(&mut c.replies, id))
        }
        let mut comments = self.comments.borrow_mut();
        if comments.values_mut().any(|list| walk(list, comment_id)) {
            Ok(())
        } else {
            Err(FeedError::NotFound("Comment not found".to_string()))
        }
    }

    async fn get_comments(&self, post_id: &str) -> FeedResult<Vec<Comment>> {
        self.gates.checkpoint("get_comments").await?;
        Ok(self.comments.borrow().get(post_id).cloned().unwrap_or_default())
    }

    async fn share_post(&self, post_id: &str) -> FeedResult<ShareRecord> {
        self.gates.checkpoint("share_post").await?;
        let mut shares = self.shares.borrow_mut();
        let list = shares.entry(post_id.to_string()).or_default();
        if list.iter().any(|s| s.user.id == self.viewer.id) {
            return Err(FeedError::Conflict("You already shared this post".to_string()));
        }
        let record = ShareRecord {
            id: self.fresh_id(),
            user: self.viewer.clone(),
            shared_at: ts(100),
            is_optimistic: false,
        };
        list.push(record.clone());
        Ok(record)
    }

    async fn unshare_post(&self, post_id: &str) -> FeedResult<()> {
        self.gates.checkpoint("unshare_post").await?;
        let mut shares = self.shares.borrow_mut();
        let list = shares.entry(post_id.to_string()).or_default();
        let before = list.len();
        list.retain(|s| s.user.id != self.viewer.id);
        if list.len() == before {
            return Err(FeedError::NotFound("Share not found".to_string()));
        }
        Ok(())
    }

    async fn get_shares(&self, post_id: &str) -> FeedResult<ShareDetails> {
        self.gates.checkpoint("get_shares").await?;
        let shares = self.shares.borrow().get(post_id).cloned().unwrap_or_default();
        Ok(ShareDetails {
            total_shares: shares.len(),
            has_user_shared: shares.iter().any(|s| s.user.id == self.viewer.id),
            shares,
        })
    }

    async fn delete_post(&self, post_id: &str) -> FeedResult<()> {
        self.gates.checkpoint("delete_post").await?;
        self.deleted_posts.borrow_mut().insert(post_id.to_string());
        Ok(())
    }
}
