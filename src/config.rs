//! Engine configuration
//!
//! Every field has a default, so a host can ship a partial JSON document
//! (or none at all) and override only what it needs.

use serde::{Deserialize, Serialize};

use crate::errors::{FeedError, FeedResult};

/// Posts requested per page
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Maximum number of ids kept in the seen-post store
pub const DEFAULT_SEEN_CAPACITY: usize = 1000;

/// Fixed key the seen-post store is persisted under
pub const DEFAULT_SEEN_STORAGE_KEY: &str = "feedline_seen_posts";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedConfig {
    pub page_size: usize,
    pub seen_capacity: usize,
    pub seen_storage_key: String,
    /// Approximate extent of one feed card along the scroll axis
    pub item_extent: f64,
    /// Cards materialized beyond each edge of the viewport
    pub buffer_count: usize,
    /// Distance from the end of content that requests the next page
    pub load_more_threshold: f64,
    /// Windowing engages only above this many items
    pub virtualization_threshold: usize,
    /// Minimum spacing between two sentinel-driven load requests
    pub sentinel_cooldown_ms: u64,
    pub counts_cache_capacity: usize,
    pub counts_cache_ttl_secs: u64,
    pub comment_max_len: usize,
    pub draft_validation_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            seen_capacity: DEFAULT_SEEN_CAPACITY,
            seen_storage_key: DEFAULT_SEEN_STORAGE_KEY.to_string(),
            item_extent: 200.0, // Typical post card height
            buffer_count: 5,
            load_more_threshold: 1000.0,
            virtualization_threshold: 50,
            sentinel_cooldown_ms: 1000,
            counts_cache_capacity: 1000,
            counts_cache_ttl_secs: 300,
            comment_max_len: 2000,
            draft_validation_delay_ms: 300,
        }
    }
}

impl FeedConfig {
    /// Parse a (possibly partial) JSON document over the defaults
    pub fn from_json(json: &str) -> FeedResult<Self> {
        let config: FeedConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FeedResult<()> {
        if self.page_size == 0 {
            return Err(FeedError::InvalidInput("page_size must be positive".to_string()));
        }
        if self.seen_capacity == 0 {
            return Err(FeedError::InvalidInput("seen_capacity must be positive".to_string()));
        }
        if self.counts_cache_capacity == 0 {
            return Err(FeedError::InvalidInput(
                "counts_cache_capacity must be positive".to_string(),
            ));
        }
        if !(self.item_extent.is_finite() && self.item_extent > 0.0) {
            return Err(FeedError::InvalidInput(format!(
                "item_extent must be a positive number, got {}",
                self.item_extent
            )));
        }
        if self.seen_storage_key.trim().is_empty() {
            return Err(FeedError::InvalidInput("seen_storage_key is empty".to_string()));
        }
        Ok(())
    }
}
