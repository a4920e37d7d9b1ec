/// Feed Engine
///
/// One handle for the presentation layer. It owns the paginator (and with it
/// the feed sequence), the seen-post store, the virtual window and the
/// interaction engine, and hands out derived read-only views:
/// - `window_items()`: the materializable cards in render order, keyed by id
/// - `interaction()` / `counts()`: per-post interaction state
/// - `has_more()`, `is_loading()`, `is_fetching_more()`
///
/// Scroll, resize and sentinel events go in through `on_scroll`, `on_resize`
/// and `on_sentinel_visible`, which request the next page when the active
/// trigger path says the user is near the end.
///
/// # Example
/// ```ignore
/// let engine = FeedEngine::new(config, source, mutations, viewer, seen)?;
/// engine.load_initial().await?;
/// for item in engine.window_items() {
///     render_card(item.key, item.offset, &item.item, engine.counts(&item.item));
/// }
/// engine.on_scroll(offset).await?;
/// ```
use std::cell::{Ref, RefCell};
use std::collections::HashSet;
use std::time::Duration;

use crate::components::infinite_scroll::{next_page_trigger, InfiniteScroll, LoadTrigger};
use crate::components::virtual_list::{VirtualScrollConfig, VirtualWindow, WindowItem};
use crate::config::FeedConfig;
use crate::errors::{FeedError, FeedResult, MutationFailure};
use crate::models::{Comment, InteractionState, Post, PostId, ReactionType, ShareRecord, UserRef};
use crate::services::aggregation::InteractionCounts;
use crate::services::feed_source::FeedDataSource;
use crate::services::mutation_service::MutationService;
use crate::services::ordering::{order_unseen_first, should_mark_seen};
use crate::stores::feed_store::{FeedPaginator, FetchOutcome};
use crate::stores::interactions::{InteractionEngine, UnshareRequest};
use crate::stores::seen_store::SeenStore;
use crate::utils::time::now_ms;
use crate::utils::validation::CommentDraft;

pub struct FeedEngine<S: FeedDataSource, M: MutationService> {
    config: FeedConfig,
    paginator: FeedPaginator<S>,
    seen: RefCell<SeenStore>,
    window: RefCell<VirtualWindow>,
    infinite_scroll: RefCell<InfiniteScroll>,
    interactions: InteractionEngine<M>,
    /// Posts deleted this session; the sequence itself stays append-only
    removed: RefCell<HashSet<PostId>>,
}

impl<S: FeedDataSource, M: MutationService> FeedEngine<S, M> {
    pub fn new(
        config: FeedConfig,
        source: S,
        mutations: M,
        viewer: UserRef,
        seen: SeenStore,
    ) -> FeedResult<Self> {
        config.validate()?;
        Ok(Self {
            paginator: FeedPaginator::new(source, config.page_size),
            seen: RefCell::new(seen),
            window: RefCell::new(VirtualWindow::new(VirtualScrollConfig::from(&config))),
            infinite_scroll: RefCell::new(InfiniteScroll::new(config.sentinel_cooldown_ms)),
            interactions: InteractionEngine::new(mutations, viewer, &config),
            removed: RefCell::new(HashSet::new()),
            config,
        })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn paginator(&self) -> &FeedPaginator<S> {
        &self.paginator
    }

    pub fn interactions(&self) -> &InteractionEngine<M> {
        &self.interactions
    }

    pub fn seen(&self) -> Ref<'_, SeenStore> {
        self.seen.borrow()
    }

    pub fn window(&self) -> Ref<'_, VirtualWindow> {
        self.window.borrow()
    }

    // ========================================================================
    // Paging
    // ========================================================================

    pub fn has_more(&self) -> bool {
        self.paginator.has_more()
    }

    pub fn is_loading(&self) -> bool {
        self.paginator.is_loading()
    }

    pub fn is_fetching_more(&self) -> bool {
        self.paginator.is_fetching_more()
    }

    pub fn last_error(&self) -> Option<FeedError> {
        self.paginator.last_error()
    }

    pub async fn load_initial(&self) -> FeedResult<FetchOutcome> {
        let outcome = self.paginator.load_initial().await;
        self.absorb(outcome)
    }

    /// Request the next page
    pub async fn load_more(&self) -> FeedResult<FetchOutcome> {
        let outcome = self.paginator.fetch_next().await;
        self.absorb(outcome)
    }

    /// Manual refresh: back to page 1. The refreshed page is not marked seen.
    pub async fn refresh(&self) -> FeedResult<FetchOutcome> {
        self.infinite_scroll.borrow_mut().reset();
        {
            let mut window = self.window.borrow_mut();
            window.set_scroll_offset(0.0);
            window.set_item_count(0);
        }
        let outcome = self.paginator.refresh().await;
        self.absorb(outcome)
    }

    /// Retry whatever failed (or is hanging) without waiting for it to settle
    pub async fn retry(&self) -> FeedResult<FetchOutcome> {
        let outcome = self.paginator.retry().await;
        self.absorb(outcome)
    }

    fn absorb(&self, outcome: FeedResult<FetchOutcome>) -> FeedResult<FetchOutcome> {
        if let Ok(FetchOutcome::Appended(page)) = &outcome {
            if should_mark_seen(page.kind) {
                self.seen.borrow_mut().mark_all(&page.ids);
            }
        }
        self.sync_item_count();
        outcome
    }

    fn sync_item_count(&self) {
        let count = self.visible_len();
        self.window.borrow_mut().set_item_count(count);
    }

    fn visible_len(&self) -> usize {
        let removed = self.removed.borrow();
        self.paginator
            .posts()
            .iter()
            .filter(|p| !removed.contains(&p.id))
            .count()
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Every live post, unseen first
    pub fn ordered_posts(&self) -> Vec<Post> {
        let removed = self.removed.borrow();
        let live: Vec<Post> = self
            .paginator
            .posts()
            .iter()
            .filter(|p| !removed.contains(&p.id))
            .cloned()
            .collect();
        let seen = self.seen.borrow();
        order_unseen_first(&live, &seen)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The cards to build right now, with their stable keys and offsets
    pub fn window_items(&self) -> Vec<WindowItem<Post>> {
        let ordered = self.ordered_posts();
        let mut window = self.window.borrow_mut();
        window.set_item_count(ordered.len());
        window
            .materialize(&ordered, |post| post.id.clone())
            .into_iter()
            .map(|item| WindowItem {
                index: item.index,
                key: item.key,
                offset: item.offset,
                item: item.item.clone(),
            })
            .collect()
    }

    // ========================================================================
    // Viewport input
    // ========================================================================

    pub async fn on_scroll(&self, offset: f64) -> FeedResult<Option<FetchOutcome>> {
        self.window.borrow_mut().set_scroll_offset(offset);
        self.maybe_load(false).await
    }

    pub async fn on_resize(&self, viewport_extent: f64) -> FeedResult<Option<FetchOutcome>> {
        self.window.borrow_mut().set_viewport_extent(viewport_extent);
        self.maybe_load(false).await
    }

    /// The sentinel after the last card became visible
    pub async fn on_sentinel_visible(&self) -> FeedResult<Option<FetchOutcome>> {
        self.on_sentinel_visible_at(now_ms()).await
    }

    pub async fn on_sentinel_visible_at(&self, now_ms: u64) -> FeedResult<Option<FetchOutcome>> {
        let trigger = self.trigger(true);
        if trigger != Some(LoadTrigger::SentinelVisible) {
            return Ok(None);
        }
        let allowed = self.infinite_scroll.borrow_mut().on_sentinel_visible(
            now_ms,
            self.has_more(),
            self.paginator.is_pending(),
        );
        if !allowed {
            return Ok(None);
        }
        self.load_more().await.map(Some)
    }

    async fn maybe_load(&self, sentinel_visible: bool) -> FeedResult<Option<FetchOutcome>> {
        match self.trigger(sentinel_visible) {
            Some(trigger) => {
                log::debug!("Next page requested by {:?}", trigger);
                self.load_more().await.map(Some)
            }
            None => Ok(None),
        }
    }

    fn trigger(&self, sentinel_visible: bool) -> Option<LoadTrigger> {
        let window = self.window.borrow();
        next_page_trigger(
            &window,
            sentinel_visible,
            self.paginator.has_more(),
            self.paginator.is_pending(),
        )
    }

    // ========================================================================
    // Interactions
    // ========================================================================

    /// Lazily fetch a card's interactions when it comes into view
    pub async fn load_interactions(&self, post: &Post) -> FeedResult<()> {
        self.interactions.load(post).await
    }

    pub fn release_interactions(&self, post: &Post) -> bool {
        self.interactions.release(post.target_id())
    }

    pub fn interaction(&self, post: &Post) -> Option<InteractionState> {
        self.interactions.state(post.target_id())
    }

    pub fn counts(&self, post: &Post) -> InteractionCounts {
        self.interactions.counts(post)
    }

    pub fn can_share(&self, post: &Post) -> bool {
        self.interactions.can_share(post)
    }

    /// Composer state for a comment or reply box
    pub fn comment_draft(&self) -> CommentDraft {
        CommentDraft::new(
            self.config.comment_max_len,
            Duration::from_millis(self.config.draft_validation_delay_ms),
        )
    }

    pub async fn toggle_reaction(&self, post: &Post) -> Result<(), MutationFailure> {
        self.interactions.toggle_reaction(post).await
    }

    pub async fn react(
        &self,
        post: &Post,
        reaction_type: ReactionType,
    ) -> Result<(), MutationFailure> {
        self.interactions.react(post, reaction_type).await
    }

    pub async fn add_comment(&self, post: &Post, text: &str) -> Result<Comment, MutationFailure> {
        self.interactions.add_comment(post, text).await
    }

    pub async fn add_reply(
        &self,
        post: &Post,
        parent_id: &str,
        text: &str,
    ) -> Result<Comment, MutationFailure> {
        self.interactions.add_reply(post, parent_id, text).await
    }

    pub async fn edit_comment(
        &self,
        post: &Post,
        comment_id: &str,
        text: &str,
    ) -> Result<Comment, MutationFailure> {
        self.interactions.edit_comment(post, comment_id, text).await
    }

    pub async fn delete_comment(&self, post: &Post, comment_id: &str) -> Result<(), MutationFailure> {
        self.interactions.delete_comment(post, comment_id).await
    }

    pub async fn share(&self, post: &Post) -> Result<ShareRecord, MutationFailure> {
        self.interactions.share(post).await
    }

    pub fn request_unshare(&self, post: &Post) -> FeedResult<UnshareRequest> {
        self.interactions.request_unshare(post)
    }

    pub async fn confirm_unshare(&self, request: UnshareRequest) -> Result<(), MutationFailure> {
        self.interactions.confirm_unshare(request).await
    }

    // ========================================================================
    // Post records
    // ========================================================================

    /// Delete one of the viewer's posts. It disappears from every view only
    /// after the server confirms.
    pub async fn delete_post(&self, post: &Post) -> FeedResult<()> {
        self.interactions.delete_post(post).await?;
        self.removed.borrow_mut().insert(post.id.clone());
        self.sync_item_count();
        Ok(())
    }

    /// Re-read one post from the source and replace its record in place
    pub async fn refresh_post(&self, post_id: &str) -> FeedResult<bool> {
        let post = self.paginator.source().get_single_post(post_id).await?;
        let target_id = post.target_id().to_string();
        let updated = self.paginator.update_post(post);
        if updated {
            self.interactions.invalidate_counts(&target_id);
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::user;
    use crate::stores::seen_store::MemoryBackend;
    use crate::testing::{MockFeedSource, MockMutationService};

    type Engine = FeedEngine<MockFeedSource, MockMutationService>;

    fn engine_with(page_lens: Vec<usize>, config: FeedConfig, backend: MemoryBackend) -> Engine {
        let seen = SeenStore::new(Box::new(backend), config.seen_capacity);
        FeedEngine::new(
            config,
            MockFeedSource::new(page_lens),
            MockMutationService::new(user("author")),
            user("author"),
            seen,
        )
        .unwrap()
    }

    fn engine(page_lens: Vec<usize>) -> Engine {
        engine_with(page_lens, FeedConfig::default(), MemoryBackend::new())
    }

    fn small_pages(page_lens: Vec<usize>) -> Engine {
        let config = FeedConfig {
            page_size: 5,
            ..FeedConfig::default()
        };
        engine_with(page_lens, config, MemoryBackend::new())
    }

    fn ids(posts: &[Post]) -> Vec<String> {
        posts.iter().map(|p| p.id.clone()).collect()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = FeedConfig {
            page_size: 0,
            ..FeedConfig::default()
        };
        let result = FeedEngine::new(
            config,
            MockFeedSource::new(vec![]),
            MockMutationService::new(user("me")),
            user("me"),
            SeenStore::with_memory(10),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_pages_until_exhausted() {
        let engine = engine(vec![20, 20, 7]);
        engine.load_initial().await.unwrap();
        while engine.has_more() {
            engine.load_more().await.unwrap();
        }
        assert_eq!(engine.ordered_posts().len(), 47);
        assert_eq!(engine.load_more().await, Ok(FetchOutcome::Exhausted));
        assert_eq!(engine.paginator().source().total_page_calls(), 3);
    }

    #[tokio::test]
    async fn test_first_page_unmarked_later_pages_marked() {
        let engine = small_pages(vec![5, 5, 5]);
        engine.load_initial().await.unwrap();
        assert!(engine.seen().is_empty());

        engine.load_more().await.unwrap();
        assert_eq!(engine.seen().len(), 5);
        assert!(engine.seen().contains(&MockFeedSource::post_id(2, 0)));

        // Unseen page 1 still leads, seen page 2 follows
        let ordered = ids(&engine.ordered_posts());
        assert_eq!(ordered[0], MockFeedSource::post_id(1, 0));
        assert_eq!(ordered[5], MockFeedSource::post_id(2, 0));
    }

    #[tokio::test]
    async fn test_refresh_does_not_mark_first_page() {
        let engine = small_pages(vec![5, 5, 5]);
        engine.load_initial().await.unwrap();
        engine.load_more().await.unwrap();

        engine.refresh().await.unwrap();
        assert_eq!(engine.ordered_posts().len(), 5);
        // Page 1 ids stay unseen after a refresh; only page 2 was ever marked
        assert!(!engine.seen().contains(&MockFeedSource::post_id(1, 0)));
        assert_eq!(engine.seen().len(), 5);
    }

    #[tokio::test]
    async fn test_seen_set_survives_reload() {
        let backend = MemoryBackend::new();
        let config = FeedConfig {
            page_size: 5,
            ..FeedConfig::default()
        };
        let first = engine_with(vec![5, 5], config.clone(), backend.clone());
        first.load_initial().await.unwrap();
        first.load_more().await.unwrap();

        let second = engine_with(vec![5, 5], config, backend);
        assert_eq!(second.seen().len(), 5);
        assert!(second.seen().contains(&MockFeedSource::post_id(2, 4)));
    }

    #[tokio::test]
    async fn test_seen_write_failure_is_not_fatal() {
        let backend = MemoryBackend::new();
        backend.set_fail_writes(true);
        let config = FeedConfig {
            page_size: 5,
            ..FeedConfig::default()
        };
        let engine = engine_with(vec![5, 5], config, backend);
        engine.load_initial().await.unwrap();

        assert!(engine.load_more().await.is_ok());
        assert_eq!(engine.seen().len(), 5);
    }

    #[tokio::test]
    async fn test_duplicate_triggers_fetch_once() {
        let engine = engine(vec![20, 20, 20]);
        engine.load_initial().await.unwrap();

        let gate = engine.paginator().source().hold_page(2);
        let (a, b, _) = futures::join!(engine.load_more(), engine.load_more(), async {
            assert!(engine.is_fetching_more());
            assert!(!engine.is_loading());
            gate.send(()).unwrap();
        });

        let outcomes = [a.unwrap(), b.unwrap()];
        assert!(outcomes.contains(&FetchOutcome::AlreadyInFlight));
        assert_eq!(outcomes.iter().filter(|o| o.page().is_some()).count(), 1);
        assert_eq!(engine.paginator().source().page_calls(2), 1);
        assert_eq!(engine.ordered_posts().len(), 40);
    }

    #[tokio::test]
    async fn test_refresh_racing_prefetch_does_not_double_advance() {
        let engine = engine(vec![20, 20, 20]);
        engine.load_initial().await.unwrap();

        let gate = engine.paginator().source().hold_page(2);
        let (prefetch, refreshed) = futures::join!(engine.load_more(), async {
            let refreshed = engine.refresh().await;
            let _ = gate.send(());
            refreshed
        });

        assert_eq!(prefetch, Ok(FetchOutcome::Discarded));
        assert!(refreshed.unwrap().page().is_some());
        assert_eq!(engine.ordered_posts().len(), 20);
        assert_eq!(engine.paginator().cursor(), 2);
        // The discarded page was never marked seen
        assert!(engine.seen().is_empty());
    }

    #[tokio::test]
    async fn test_retry_after_failure() {
        let engine = engine(vec![20, 20, 20]);
        engine.load_initial().await.unwrap();
        engine
            .paginator()
            .source()
            .fail_page(2, FeedError::Transport("timeout".into()));

        assert!(engine.load_more().await.is_err());
        assert!(engine.last_error().unwrap().is_retryable());
        assert_eq!(engine.ordered_posts().len(), 20);

        let outcome = engine.retry().await.unwrap();
        assert_eq!(outcome.page().map(|p| p.cursor), Some(2));
        assert_eq!(engine.seen().len(), 20);
    }

    #[tokio::test]
    async fn test_scroll_near_end_loads_next_page() {
        let engine = engine(vec![20, 20, 20, 20, 5]);
        engine.load_initial().await.unwrap();
        engine.load_more().await.unwrap();
        engine.load_more().await.unwrap();
        assert!(engine.window().is_virtualized());

        assert_eq!(engine.on_scroll(0.0).await, Ok(None));
        // 60 items * 200 = 12000; 12000 - (10500 + 800) = 700 < 1000
        let outcome = engine.on_scroll(10_500.0).await.unwrap();
        assert_eq!(outcome.and_then(|o| o.page().map(|p| p.cursor)), Some(4));
        assert_eq!(engine.window().item_count(), 80);
    }

    #[tokio::test]
    async fn test_resize_can_trigger_load() {
        let engine = engine(vec![20, 20, 20, 20]);
        engine.load_initial().await.unwrap();
        engine.load_more().await.unwrap();
        engine.load_more().await.unwrap();

        assert_eq!(engine.on_scroll(9_000.0).await, Ok(None));
        // A taller viewport brings the end within the threshold
        let outcome = engine.on_resize(2_500.0).await.unwrap();
        assert!(outcome.is_some());
    }

    #[tokio::test]
    async fn test_sentinel_drives_small_feeds_with_cooldown() {
        let engine = engine(vec![20, 20, 20]);
        engine.load_initial().await.unwrap();
        assert!(!engine.window().is_virtualized());

        // Scroll arithmetic is inactive below the threshold
        assert_eq!(engine.on_scroll(3_500.0).await, Ok(None));

        let first = engine.on_sentinel_visible_at(1_000).await.unwrap();
        assert!(first.is_some());
        assert_eq!(engine.on_sentinel_visible_at(1_500).await, Ok(None));
        let second = engine.on_sentinel_visible_at(2_100).await.unwrap();
        assert_eq!(second.and_then(|o| o.page().map(|p| p.cursor)), Some(3));
    }

    #[tokio::test]
    async fn test_window_items_are_keyed_and_bounded() {
        let engine = engine(vec![20, 20, 20, 20]);
        engine.load_initial().await.unwrap();
        engine.load_more().await.unwrap();
        engine.load_more().await.unwrap();

        engine.on_scroll(4_000.0).await.unwrap();
        let items = engine.window_items();
        // floor(4000/200) - 5 = 15, ceil(4800/200) + 5 = 29
        assert_eq!(items.first().map(|i| i.index), Some(15));
        assert_eq!(items.len(), 14);
        assert!(items.iter().all(|i| i.key == i.item.id));
        assert_eq!(items[0].offset, 3_000.0);
        assert_eq!(engine.window().total_extent(), 12_000.0);
    }

    #[tokio::test]
    async fn test_interactions_through_engine() {
        let engine = engine(vec![3]);
        engine.load_initial().await.unwrap();
        let post = engine.ordered_posts()[0].clone();

        assert_eq!(engine.counts(&post).reactions, 0);
        engine.toggle_reaction(&post).await.unwrap();
        assert_eq!(engine.counts(&post).reactions, 1);
        assert!(engine.interaction(&post).unwrap().has_reacted());

        engine.add_comment(&post, "nice").await.unwrap();
        assert_eq!(engine.counts(&post).comments, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_comment_draft_follows_config() {
        use crate::utils::validation::DraftIssue;

        let config = FeedConfig {
            comment_max_len: 5,
            draft_validation_delay_ms: 300,
            ..FeedConfig::default()
        };
        let engine = engine_with(vec![20], config, MemoryBackend::new());
        let draft = engine.comment_draft();

        let (validated, _) = futures::join!(draft.input("way too long"), async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            assert_eq!(draft.issue(), None);
        });
        assert!(validated);
        assert_eq!(draft.issue(), Some(DraftIssue::TooLong { len: 12, max: 5 }));
    }

    #[tokio::test]
    async fn test_delete_post_hides_after_confirmation() {
        let engine = engine(vec![3]);
        engine.load_initial().await.unwrap();
        let post = engine.ordered_posts()[1].clone();

        let gate = engine.interactions().service().hold("delete_post");
        let (result, _) = futures::join!(engine.delete_post(&post), async {
            assert_eq!(engine.ordered_posts().len(), 3);
            gate.send(()).unwrap();
        });
        result.unwrap();

        let remaining = ids(&engine.ordered_posts());
        assert_eq!(remaining.len(), 2);
        assert!(!remaining.contains(&post.id));
        assert!(engine.paginator().contains(&post.id));
        assert_eq!(engine.window().item_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_post() {
        let engine = engine(vec![3]);
        engine.load_initial().await.unwrap();
        let post = engine.ordered_posts()[0].clone();

        engine
            .interactions()
            .service()
            .fail_next("delete_post", FeedError::Transport("offline".into()));
        assert!(engine.delete_post(&post).await.is_err());
        assert_eq!(engine.ordered_posts().len(), 3);
    }

    #[tokio::test]
    async fn test_refresh_post_replaces_record() {
        let engine = engine(vec![3]);
        engine.load_initial().await.unwrap();
        let mut fresh = engine.ordered_posts()[2].clone();
        fresh.reactions_count = Some(7);
        fresh.has_user_shared = true;
        engine.paginator().source().set_single(fresh.clone());

        assert_eq!(engine.refresh_post(&fresh.id).await, Ok(true));
        let posts = engine.ordered_posts();
        assert_eq!(posts[2], fresh);
        let counts = engine.counts(&posts[2]);
        assert_eq!(counts.reactions, 7);
        assert!(counts.user_shared);

        assert!(engine.refresh_post("missing").await.is_err());
    }
}
