// Viewport components
// Decide what to materialize and when the next page is wanted

pub mod infinite_scroll;
pub mod virtual_list;

pub use infinite_scroll::{next_page_trigger, InfiniteScroll, LoadTrigger};
pub use virtual_list::{VirtualScrollConfig, VirtualWindow, VisibleRange, WindowItem};
