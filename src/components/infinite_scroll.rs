/// Infinite scroll sentinel
///
/// Below the windowing threshold every card is rendered and a sentinel
/// element after the last card reports when it enters the viewport. That
/// report asks for the next page, at most once per cooldown window, and only
/// when more pages exist and nothing is loading. This is the same "request
/// the next page when near the end" decision the virtual window makes from
/// scroll arithmetic.
use crate::components::virtual_list::VirtualWindow;

/// Which path asked for the next page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadTrigger {
    ScrollProximity,
    SentinelVisible,
}

#[derive(Clone, Debug)]
pub struct InfiniteScroll {
    cooldown_ms: u64,
    last_trigger_ms: Option<u64>,
}

impl InfiniteScroll {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms,
            last_trigger_ms: None,
        }
    }

    /// The sentinel intersected the viewport at `now_ms`
    pub fn on_sentinel_visible(&mut self, now_ms: u64, has_more: bool, loading: bool) -> bool {
        if !has_more || loading {
            log::debug!(
                "Infinite scroll disabled: has_more={}, loading={}",
                has_more,
                loading
            );
            return false;
        }

        if let Some(last) = self.last_trigger_ms {
            if now_ms.saturating_sub(last) < self.cooldown_ms {
                return false;
            }
        }

        log::info!("Sentinel visible - requesting next page");
        self.last_trigger_ms = Some(now_ms);
        true
    }

    /// Forget the cooldown, e.g. after a refresh
    pub fn reset(&mut self) {
        self.last_trigger_ms = None;
    }
}

/// Pick the trigger path that is active for the window's current item count
pub fn next_page_trigger(
    window: &VirtualWindow,
    sentinel_visible: bool,
    has_more: bool,
    fetch_pending: bool,
) -> Option<LoadTrigger> {
    if window.is_virtualized() {
        window
            .should_load_more(has_more, fetch_pending)
            .then_some(LoadTrigger::ScrollProximity)
    } else if sentinel_visible && has_more && !fetch_pending {
        Some(LoadTrigger::SentinelVisible)
    } else {
        None
    }
}
