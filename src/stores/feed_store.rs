//! Pagination Cursor Manager
//!
//! Owns the feed sequence: every fetched page flattened, de-duplicated and in
//! server order. The cursor starts at page 1 and only advances past a full
//! page; a short page marks the feed exhausted until the next reset.
//!
//! All methods take `&self` so that a scroll-driven prefetch, a resize and a
//! manual refresh can interleave at their suspension points. Each request
//! carries a sequence number; a response whose request is no longer the one
//! registered (reset, retry) is discarded instead of appended.

use futures::future::{AbortHandle, Abortable};
use std::cell::{Ref, RefCell};
use std::collections::HashSet;

use crate::errors::{FeedError, FeedResult};
use crate::models::{Post, PostId};
use crate::services::feed_source::FeedDataSource;
use crate::services::ordering::LoadKind;

/// A page that made it into the sequence
#[derive(Clone, Debug, PartialEq)]
pub struct PageFetched {
    pub cursor: u32,
    pub kind: LoadKind,
    /// Every id the server returned, duplicates included
    pub ids: Vec<PostId>,
    /// How many of them were new to the sequence
    pub added: usize,
    pub exhausted: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    Appended(PageFetched),
    /// No-op: the feed is exhausted
    Exhausted,
    /// No-op: the same cursor is already being fetched
    AlreadyInFlight,
    /// No-op: the first page is already in the feed (use refresh to reload)
    AlreadyLoaded,
    /// The response arrived after its request was superseded
    Discarded,
}

impl FetchOutcome {
    pub fn page(&self) -> Option<&PageFetched> {
        match self {
            FetchOutcome::Appended(page) => Some(page),
            _ => None,
        }
    }
}

struct InFlight {
    cursor: u32,
    request_id: u64,
    kind: LoadKind,
    abort: AbortHandle,
}

struct PaginationState {
    posts: Vec<Post>,
    ids: HashSet<PostId>,
    next_cursor: u32,
    exhausted: bool,
    in_flight: Option<InFlight>,
    request_seq: u64,
    pages_loaded: u32,
    last_error: Option<FeedError>,
    last_failed_kind: Option<LoadKind>,
}

impl PaginationState {
    fn new(request_seq: u64) -> Self {
        Self {
            posts: Vec::new(),
            ids: HashSet::new(),
            next_cursor: 1,
            exhausted: false,
            in_flight: None,
            request_seq,
            pages_loaded: 0,
            last_error: None,
            last_failed_kind: None,
        }
    }
}

pub struct FeedPaginator<S: FeedDataSource> {
    source: S,
    page_size: usize,
    state: RefCell<PaginationState>,
}

impl<S: FeedDataSource> FeedPaginator<S> {
    pub fn new(source: S, page_size: usize) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            state: RefCell::new(PaginationState::new(0)),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The flattened sequence. Do not hold across an await.
    pub fn posts(&self) -> Ref<'_, [Post]> {
        Ref::map(self.state.borrow(), |s| s.posts.as_slice())
    }

    pub fn len(&self) -> usize {
        self.state.borrow().posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().posts.is_empty()
    }

    pub fn contains(&self, post_id: &str) -> bool {
        self.state.borrow().ids.contains(post_id)
    }

    /// Page index the next fetch will request
    pub fn cursor(&self) -> u32 {
        self.state.borrow().next_cursor
    }

    pub fn pages_loaded(&self) -> u32 {
        self.state.borrow().pages_loaded
    }

    pub fn has_more(&self) -> bool {
        !self.state.borrow().exhausted
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.borrow().exhausted
    }

    /// First page (initial or refresh) in flight
    pub fn is_loading(&self) -> bool {
        matches!(
            self.state.borrow().in_flight.as_ref().map(|f| f.kind),
            Some(LoadKind::Initial) | Some(LoadKind::Refresh)
        )
    }

    /// Next page in flight
    pub fn is_fetching_more(&self) -> bool {
        matches!(
            self.state.borrow().in_flight.as_ref().map(|f| f.kind),
            Some(LoadKind::More)
        )
    }

    pub fn is_pending(&self) -> bool {
        self.state.borrow().in_flight.is_some()
    }

    pub fn last_error(&self) -> Option<FeedError> {
        self.state.borrow().last_error.clone()
    }

    /// Load page 1 on mount. Does nothing once pages are loaded.
    pub async fn load_initial(&self) -> FeedResult<FetchOutcome> {
        if self.state.borrow().pages_loaded > 0 {
            return Ok(FetchOutcome::AlreadyLoaded);
        }
        self.fetch(LoadKind::Initial).await
    }

    /// Fetch the page at the cursor (explicit, non-refresh load)
    pub async fn fetch_next(&self) -> FeedResult<FetchOutcome> {
        self.fetch(LoadKind::More).await
    }

    /// Drop everything and start again from page 1
    pub async fn refresh(&self) -> FeedResult<FetchOutcome> {
        self.reset();
        self.fetch(LoadKind::Refresh).await
    }

    /// Discard the sequence and cursor. An in-flight fetch is aborted and its
    /// eventual result ignored.
    pub fn reset(&self) {
        let mut state = self.state.borrow_mut();
        if let Some(in_flight) = state.in_flight.take() {
            log::debug!(
                "Reset aborts in-flight fetch of page {} (request {})",
                in_flight.cursor,
                in_flight.request_id
            );
            in_flight.abort.abort();
        }
        let seq = state.request_seq;
        *state = PaginationState::new(seq);
        log::info!("Feed reset to page 1");
    }

    /// Re-request the current cursor right away, superseding any attempt that
    /// has not settled yet.
    pub async fn retry(&self) -> FeedResult<FetchOutcome> {
        let kind = {
            let mut state = self.state.borrow_mut();
            match state.in_flight.take() {
                Some(in_flight) => {
                    in_flight.abort.abort();
                    in_flight.kind
                }
                None => state.last_failed_kind.unwrap_or(LoadKind::More),
            }
        };
        log::info!("Retrying feed fetch ({:?})", kind);
        self.fetch(kind).await
    }

    /// Replace a post's record in place (fresh counts, share flag). Order and
    /// membership of the sequence are untouched.
    pub fn update_post(&self, post: Post) -> bool {
        let mut state = self.state.borrow_mut();
        match state.posts.iter_mut().find(|p| p.id == post.id) {
            Some(slot) => {
                *slot = post;
                true
            }
            None => false,
        }
    }

    async fn fetch(&self, kind: LoadKind) -> FeedResult<FetchOutcome> {
        let (cursor, request_id, registration) = {
            let mut state = self.state.borrow_mut();
            if state.exhausted {
                log::debug!("Feed exhausted, not fetching page {}", state.next_cursor);
                return Ok(FetchOutcome::Exhausted);
            }
            if let Some(in_flight) = &state.in_flight {
                if in_flight.cursor == state.next_cursor {
                    log::debug!("Page {} already in flight", in_flight.cursor);
                    return Ok(FetchOutcome::AlreadyInFlight);
                }
            }

            let (abort, registration) = AbortHandle::new_pair();
            state.request_seq += 1;
            let request_id = state.request_seq;
            let cursor = state.next_cursor;
            state.in_flight = Some(InFlight {
                cursor,
                request_id,
                kind,
                abort,
            });
            (cursor, request_id, registration)
        };

        log::info!("Fetching page {} ({:?}, request {})", cursor, kind, request_id);
        let result = Abortable::new(self.source.get_page(cursor, self.page_size), registration).await;

        let mut state = self.state.borrow_mut();
        let is_current = state
            .in_flight
            .as_ref()
            .map(|f| f.request_id == request_id)
            .unwrap_or(false);
        if !is_current {
            log::debug!("Discarding stale response for page {} (request {})", cursor, request_id);
            return Ok(FetchOutcome::Discarded);
        }
        state.in_flight = None;

        let page = match result {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                log::error!("Failed to fetch page {}: {}", cursor, e);
                state.last_error = Some(e.clone());
                state.last_failed_kind = Some(kind);
                return Err(e);
            }
            Err(_aborted) => return Ok(FetchOutcome::Discarded),
        };

        let exhausted = page.is_short(self.page_size);
        let mut ids = Vec::with_capacity(page.len());
        let mut added = 0;
        for post in page.posts {
            ids.push(post.id.clone());
            if state.ids.insert(post.id.clone()) {
                state.posts.push(post);
                added += 1;
            }
        }

        if exhausted {
            state.exhausted = true;
            log::info!("Page {} was short ({} posts), feed exhausted", cursor, ids.len());
        } else {
            state.next_cursor += 1;
        }
        state.pages_loaded += 1;
        state.last_error = None;
        state.last_failed_kind = None;

        log::debug!(
            "Page {} appended {} of {} posts ({} total)",
            cursor,
            added,
            ids.len(),
            state.posts.len()
        );

        Ok(FetchOutcome::Appended(PageFetched {
            cursor,
            kind,
            ids,
            added,
            exhausted,
        }))
    }
}
