/// Feed Ordering Policy
///
/// Unseen posts surface first. Both groups keep their server order, so the
/// result is a stable partition of the feed sequence.
use crate::models::Post;
use crate::stores::seen_store::SeenStore;

/// How a page was requested
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadKind {
    /// First page on mount
    Initial,
    /// Manual pull-to-refresh: cursor reset to page 1
    Refresh,
    /// Scroll or sentinel driven next page
    More,
}

/// Whether the ids of a fetched page should be recorded as seen.
///
/// The first page of an initial load or a refresh is deliberately left
/// unmarked so that a refresh can bring recently seen posts back to the top
/// of the unseen group instead of burying them.
pub fn should_mark_seen(kind: LoadKind) -> bool {
    matches!(kind, LoadKind::More)
}

/// Stable partition: unseen posts first, then seen, each in original order
pub fn order_unseen_first<'a>(posts: &'a [Post], seen: &SeenStore) -> Vec<&'a Post> {
    let (unseen, already_seen): (Vec<&Post>, Vec<&Post>) =
        posts.iter().partition(|post| !seen.contains(&post.id));
    unseen.into_iter().chain(already_seen).collect()
}
