// External boundaries and pure policies

pub mod aggregation;
pub mod feed_source;
pub mod mutation_service;
pub mod ordering;

pub use aggregation::{CountsCache, InteractionCounts};
pub use feed_source::{FeedDataSource, Page};
pub use mutation_service::MutationService;
pub use ordering::{order_unseen_first, should_mark_seen, LoadKind};
