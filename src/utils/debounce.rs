/// Debounce combinator
///
/// Every call to `run` supersedes the ones before it: after `delay` the
/// closure only runs if no newer call arrived in the meantime. The debouncer is
/// a plain value owned by whoever needs it; there are no global timer handles
/// to clear.
///
/// # Example
/// ```ignore
/// let debouncer = Debouncer::new(Duration::from_millis(300));
/// // Called on every keystroke; only the last one inside 300ms validates
/// if let Some(issue) = debouncer.run(|| validate(&text)).await { ... }
/// ```
use std::cell::Cell;
use std::time::Duration;

use crate::utils::time::sleep;

pub struct Debouncer {
    delay: Duration,
    generation: Cell<u64>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Cell::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait out the delay, then run `f` unless a newer call superseded this one.
    /// Returns None when superseded or cancelled.
    pub async fn run<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce() -> T,
    {
        let ticket = self.bump();
        sleep(self.delay).await;
        if self.generation.get() != ticket {
            return None;
        }
        Some(f())
    }

    /// Drop whatever call is waiting
    pub fn cancel(&self) {
        self.bump();
    }

    fn bump(&self) -> u64 {
        let next = self.generation.get().wrapping_add(1);
        self.generation.set(next);
        next
    }
}
