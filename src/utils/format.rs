/// Counts above this render as "500+"
pub const MAX_DISPLAYED_COUNT: usize = 500;

/// Render an interaction count for a card's action bar.
///
/// Zero renders as an empty label so the icon stands alone.
pub fn format_count(count: usize) -> String {
    match count {
        0 => String::new(),
        n if n > MAX_DISPLAYED_COUNT => format!("{}+", MAX_DISPLAYED_COUNT),
        n => n.to_string(),
    }
}
