pub mod feed_context;

pub use feed_context::FeedEngine;
