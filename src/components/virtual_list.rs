/// Virtual Window Renderer
///
/// Decides which slice of an unbounded feed must be materialized. Items
/// outside the slice are represented by reserved space of
/// `item_count * item_extent`, so the scrollbar stays correct without
/// building off-screen cards.
///
/// Windowing only engages above `activation_threshold` items. Below it every
/// item renders directly and the infinite-scroll sentinel drives paging
/// instead (see `infinite_scroll`).
use crate::config::FeedConfig;

/// Configuration for virtual scrolling behavior
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VirtualScrollConfig {
    /// Approximate extent of one item along the scroll axis
    pub item_extent: f64,
    /// Items rendered beyond each edge of the viewport
    pub buffer_count: usize,
    /// Distance from the end of content below which the next page is wanted
    pub load_more_threshold: f64,
    /// Windowing engages only when the item count exceeds this
    pub activation_threshold: usize,
}

impl Default for VirtualScrollConfig {
    fn default() -> Self {
        Self {
            item_extent: 200.0,
            buffer_count: 5,
            load_more_threshold: 1000.0,
            activation_threshold: 50,
        }
    }
}

impl From<&FeedConfig> for VirtualScrollConfig {
    fn from(config: &FeedConfig) -> Self {
        Self {
            item_extent: config.item_extent,
            buffer_count: config.buffer_count,
            load_more_threshold: config.load_more_threshold,
            activation_threshold: config.virtualization_threshold,
        }
    }
}

/// Half-open index range `[start, end)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize,
}

impl VisibleRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }
}

/// One materialized item with its position in the scroll content
#[derive(Clone, Debug, PartialEq)]
pub struct WindowItem<T> {
    pub index: usize,
    /// Stable key for the presentation layer (the post id)
    pub key: String,
    /// Leading edge along the scroll axis
    pub offset: f64,
    pub item: T,
}

#[derive(Clone, Debug)]
pub struct VirtualWindow {
    config: VirtualScrollConfig,
    scroll_offset: f64,
    viewport_extent: f64,
    item_count: usize,
    range: VisibleRange,
}

impl VirtualWindow {
    pub fn new(config: VirtualScrollConfig) -> Self {
        let mut window = Self {
            config,
            scroll_offset: 0.0,
            viewport_extent: 800.0, // Until the first resize reports the real size
            item_count: 0,
            range: VisibleRange::default(),
        };
        window.recompute();
        window
    }

    pub fn config(&self) -> &VirtualScrollConfig {
        &self.config
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn scroll_offset(&self) -> f64 {
        self.scroll_offset
    }

    pub fn viewport_extent(&self) -> f64 {
        self.viewport_extent
    }

    /// Returns true if the visible range changed
    pub fn set_scroll_offset(&mut self, offset: f64) -> bool {
        self.scroll_offset = sanitize(offset);
        self.recompute()
    }

    /// Container resize
    pub fn set_viewport_extent(&mut self, extent: f64) -> bool {
        self.viewport_extent = sanitize(extent);
        self.recompute()
    }

    pub fn set_item_count(&mut self, count: usize) -> bool {
        self.item_count = count;
        self.recompute()
    }

    pub fn is_virtualized(&self) -> bool {
        self.item_count > self.config.activation_threshold
    }

    pub fn visible_range(&self) -> VisibleRange {
        self.range
    }

    /// Extent reserved for the whole sequence
    pub fn total_extent(&self) -> f64 {
        self.item_count as f64 * self.item_extent()
    }

    pub fn item_offset(&self, index: usize) -> f64 {
        index as f64 * self.item_extent()
    }

    /// Empty space before the first materialized item
    pub fn leading_space(&self) -> f64 {
        self.item_offset(self.range.start)
    }

    /// Empty space after the last materialized item
    pub fn trailing_space(&self) -> f64 {
        (self.item_count - self.range.end) as f64 * self.item_extent()
    }

    pub fn distance_to_end(&self) -> f64 {
        (self.total_extent() - (self.scroll_offset + self.viewport_extent)).max(0.0)
    }

    /// Scroll-offset path of the load-more trigger. Only meaningful while
    /// windowing is engaged; below the threshold the sentinel decides.
    pub fn should_load_more(&self, has_more: bool, fetch_pending: bool) -> bool {
        self.is_virtualized()
            && has_more
            && !fetch_pending
            && self.distance_to_end() < self.config.load_more_threshold
    }

    /// Materialize the items of the current range
    pub fn materialize<'a, T>(
        &self,
        items: &'a [T],
        key: impl Fn(&T) -> String,
    ) -> Vec<WindowItem<&'a T>> {
        let end = self.range.end.min(items.len());
        let start = self.range.start.min(end);
        items[start..end]
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let index = start + i;
                WindowItem {
                    index,
                    key: key(item),
                    offset: self.item_offset(index),
                    item,
                }
            })
            .collect()
    }

    fn item_extent(&self) -> f64 {
        if self.config.item_extent.is_finite() && self.config.item_extent > 0.0 {
            self.config.item_extent
        } else {
            1.0
        }
    }

    fn recompute(&mut self) -> bool {
        let next = if self.is_virtualized() {
            self.calculate_range()
        } else {
            VisibleRange {
                start: 0,
                end: self.item_count,
            }
        };
        let changed = next != self.range;
        if changed {
            log::trace!(
                "Visible range {}..{} of {} (offset {})",
                next.start,
                next.end,
                self.item_count,
                self.scroll_offset
            );
        }
        self.range = next;
        changed
    }

    fn calculate_range(&self) -> VisibleRange {
        let extent = self.item_extent();
        let first = (self.scroll_offset / extent).floor() as usize;
        let last = ((self.scroll_offset + self.viewport_extent) / extent).ceil() as usize;

        let end = last
            .saturating_add(self.config.buffer_count)
            .min(self.item_count);
        let start = first.saturating_sub(self.config.buffer_count).min(end);
        VisibleRange { start, end }
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(count: usize) -> VirtualWindow {
        let mut window = VirtualWindow::new(VirtualScrollConfig {
            item_extent: 100.0,
            buffer_count: 2,
            load_more_threshold: 1000.0,
            activation_threshold: 50,
        });
        window.set_viewport_extent(500.0);
        window.set_item_count(count);
        window
    }

    #[test]
    fn test_range_formula() {
        let mut w = window(200);
        w.set_scroll_offset(1050.0);
        // floor(10.5) - 2 = 8, ceil(15.5) + 2 = 18
        assert_eq!(w.visible_range(), VisibleRange { start: 8, end: 18 });
        assert_eq!(w.leading_space(), 800.0);
        assert_eq!(w.trailing_space(), 18200.0);
        assert_eq!(w.total_extent(), 20000.0);
    }

    #[test]
    fn test_range_clamped_at_edges() {
        let mut w = window(60);
        w.set_scroll_offset(0.0);
        assert_eq!(w.visible_range(), VisibleRange { start: 0, end: 7 });

        w.set_scroll_offset(5800.0);
        assert_eq!(w.visible_range().end, 60);

        // Scrolled far past the content after the list shrank
        w.set_scroll_offset(1.0e9);
        let range = w.visible_range();
        assert!(range.start <= range.end);
        assert_eq!(range.end, 60);
    }

    #[test]
    fn test_range_bounds_hold_for_any_geometry() {
        let counts = [0usize, 1, 49, 50, 51, 300];
        let offsets = [-50.0, 0.0, 33.3, 999.9, 12_345.0, f64::NAN, f64::INFINITY];
        let viewports = [0.0, 1.0, 480.0, 4000.0];
        for &count in &counts {
            for &offset in &offsets {
                for &viewport in &viewports {
                    let mut w = window(count);
                    w.set_viewport_extent(viewport);
                    w.set_scroll_offset(offset);
                    let r = w.visible_range();
                    assert!(r.start <= r.end && r.end <= count, "{:?} count={}", r, count);
                }
            }
        }
    }

    #[test]
    fn test_sub_item_scroll_never_skips_visible_items() {
        let mut w = window(500);
        let mut offset = 0.0;
        let mut previous = w.visible_range();
        while offset < 40_000.0 {
            offset += 73.0; // less than one item extent
            w.set_scroll_offset(offset);
            let current = w.visible_range();
            // The item at the top of the old viewport is still rendered
            let top = (offset / 100.0).floor() as usize;
            assert!(current.contains(top.min(499)));
            assert!(current.start <= previous.end);
            previous = current;
        }
    }

    #[test]
    fn test_below_threshold_renders_everything() {
        let mut w = window(50);
        w.set_scroll_offset(3000.0);
        assert!(!w.is_virtualized());
        assert_eq!(w.visible_range(), VisibleRange { start: 0, end: 50 });
        assert!(!w.should_load_more(true, false));

        w.set_item_count(51);
        assert!(w.is_virtualized());
        assert_ne!(w.visible_range().start, 0);
    }

    #[test]
    fn test_load_more_near_end() {
        let mut w = window(100); // 10_000 of content
        w.set_scroll_offset(8000.0);
        // 10_000 - 8_500 = 1_500 left
        assert!(!w.should_load_more(true, false));
        w.set_scroll_offset(8600.0);
        assert!(w.should_load_more(true, false));
        assert!(!w.should_load_more(false, false));
        assert!(!w.should_load_more(true, true));
    }

    #[test]
    fn test_resize_recomputes_range() {
        let mut w = window(100);
        w.set_scroll_offset(2000.0);
        let before = w.visible_range();
        assert!(w.set_viewport_extent(1500.0));
        assert!(w.visible_range().end > before.end);
    }

    #[test]
    fn test_materialize_keys_and_offsets() {
        let items: Vec<String> = (0..80).map(|i| format!("post-{}", i)).collect();
        let mut w = window(items.len());
        w.set_scroll_offset(2000.0);
        let slice = w.materialize(&items, |s| s.clone());
        assert_eq!(slice.len(), w.visible_range().len());
        assert_eq!(slice[0].index, 18);
        assert_eq!(slice[0].key, "post-18");
        assert_eq!(slice[0].offset, 1800.0);
    }
}
