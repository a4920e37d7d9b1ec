/// Interaction counts and their cache
///
/// Feed cards only need counts, not full reaction/comment/share lists. Counts
/// are derived from a loaded `InteractionState` when one exists and cached
/// here so a card that scrolls out (and has its state released) can still
/// show numbers when it comes back.
///
/// # Caching
/// - LRU eviction bounds the cache (default 1000 posts)
/// - Entries expire after a TTL (default 5 minutes)
/// - Any settled mutation on a post invalidates its entry
use instant::{Duration, Instant};
use lru::LruCache;
use std::num::NonZeroUsize;

use crate::models::{InteractionState, Post};
use crate::utils::format::format_count;

/// Aggregated interaction counts for a single post
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InteractionCounts {
    pub reactions: usize,
    pub comments: usize,
    pub shares: usize,
    /// Whether the viewer has reacted (None if not known yet)
    pub user_reacted: Option<bool>,
    pub user_shared: bool,
}

impl InteractionCounts {
    pub fn from_state(state: &InteractionState) -> Self {
        Self {
            reactions: state.reaction_count(),
            comments: state.total_comment_count(),
            shares: state.share_details.total_shares,
            user_reacted: Some(state.has_reacted()),
            user_shared: state.share_details.has_user_shared,
        }
    }

    /// Whatever the page carried; missing counts read as zero
    pub fn from_post(post: &Post) -> Self {
        let target = post.target();
        Self {
            reactions: target.reactions_count.unwrap_or(0),
            comments: target.comments_count.unwrap_or(0),
            shares: target.shares_count.unwrap_or(0),
            user_reacted: None,
            user_shared: target.has_user_shared,
        }
    }

    /// Labels for the card's action bar
    pub fn labels(&self) -> (String, String, String) {
        (
            format_count(self.reactions),
            format_count(self.comments),
            format_count(self.shares),
        )
    }
}

/// Cache entry with TTL tracking
#[derive(Clone, Debug)]
struct CachedCounts {
    counts: InteractionCounts,
    cached_at: Instant,
}

impl CachedCounts {
    fn new(counts: InteractionCounts) -> Self {
        Self {
            counts,
            cached_at: Instant::now(),
        }
    }

    fn is_valid(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() < ttl
    }
}

pub struct CountsCache {
    cache: LruCache<String, CachedCounts>,
    ttl: Duration,
}

impl CountsCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            ttl,
        }
    }

    /// Cached counts if present and still fresh
    pub fn get(&mut self, post_id: &str) -> Option<InteractionCounts> {
        match self.cache.get(post_id) {
            Some(cached) if cached.is_valid(self.ttl) => Some(cached.counts.clone()),
            Some(_) => {
                self.cache.pop(post_id);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, post_id: impl Into<String>, counts: InteractionCounts) {
        self.cache.put(post_id.into(), CachedCounts::new(counts));
    }

    pub fn invalidate(&mut self, post_id: &str) {
        if self.cache.pop(post_id).is_some() {
            log::debug!("Invalidated cached counts for {}", post_id);
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
