// State owners
// Each store is the single writer of its state; everything else reads views

pub mod feed_store;
pub mod interactions;
pub mod mutations;
pub mod seen_store;

pub use feed_store::{FeedPaginator, FetchOutcome, PageFetched};
pub use interactions::{InteractionEngine, UnshareRequest};
pub use mutations::{MutationScope, OptimisticMutation};
pub use seen_store::{MemoryBackend, SeenBackend, SeenStore};

#[cfg(not(target_arch = "wasm32"))]
pub use seen_store::FileBackend;
#[cfg(target_arch = "wasm32")]
pub use seen_store::LocalStorageBackend;
