//! feedline - feed synchronization engine
//!
//! Headless core of an infinite social feed: cursor pagination against a
//! feed source, an unseen-first ordering backed by a persisted seen-post
//! store, a virtual window over the result, and optimistic reactions,
//! comments and shares with exact rollback.
//!
//! Everything runs on one cooperative context (the browser event loop, or a
//! current-thread runtime natively); shared state lives in `RefCell`s that
//! are never borrowed across an await.

pub mod components;
pub mod config;
pub mod context;
pub mod errors;
pub mod models;
pub mod services;
pub mod stores;
pub mod utils;

#[cfg(test)]
mod testing;

pub use config::FeedConfig;
pub use context::FeedEngine;
pub use errors::{FeedError, FeedResult, MutationFailure};
pub use models::{Comment, InteractionState, Post, ReactionRecord, ReactionType, UserRef};

/// Install the logger. On the web this routes `log` to the browser console
/// and turns panics into console errors; native hosts install their own
/// `log` backend and this does nothing.
pub fn init_logging(level: log::Level) {
    #[cfg(target_arch = "wasm32")]
    {
        console_error_panic_hook::set_once();
        wasm_logger::init(wasm_logger::Config::new(level));
    }

    #[cfg(not(target_arch = "wasm32"))]
    let _ = level;

    log::info!("feedline logging initialized");
}
