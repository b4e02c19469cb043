use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Coalesces bursts of trigger events into one deferred action.
///
/// The first trigger schedules a fire one settling window later; further
/// triggers inside the window are dropped, not queued, so a stream of
/// viewport changes produces exactly one recount per window. A pending
/// fire can be invalidated (e.g. when its map is unloaded), in which case
/// it silently does nothing.
pub struct Debouncer {
    window: Duration,
    pending: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Requests `job` to run after the settling window.
    ///
    /// Returns `true` when this call scheduled the fire, `false` when an
    /// earlier trigger already has one pending and this event was dropped.
    pub fn trigger<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.pending.swap(true, Ordering::SeqCst) {
            return false;
        }

        let scheduled_generation = self.generation.load(Ordering::SeqCst);
        let pending = self.pending.clone();
        let generation = self.generation.clone();
        let window = self.window;

        thread::spawn(move || {
            thread::sleep(window);
            pending.store(false, Ordering::SeqCst);
            if generation.load(Ordering::SeqCst) == scheduled_generation {
                job();
            } else {
                log::debug!("debounced job invalidated before firing");
            }
        });
        true
    }

    /// Invalidates any pending fire; it becomes a no-op instead of running.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}
