use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// One scheduled callback.
///
/// `created_at` resets to the poll time on every repeat, so a repeating
/// timer reschedules relative to when it actually fired rather than
/// accumulating drift from slow polls.
struct TimerEntry<C> {
    created_at: Instant,
    interval: Duration,
    context: String,
    callback: Box<dyn FnMut(&mut C) -> bool + Send>,
    repeat: bool,
}

impl<C> TimerEntry<C> {
    fn is_due(&self, now: Instant) -> bool {
        now >= self.created_at + self.interval
    }
}

/// Cooperative timer list, polled once per dispatch tick.
///
/// There is no scheduler thread: the owner calls [`TimerService::poll`] from
/// its single dispatch context, which is what lets callbacks take `&mut C`
/// to the state they maintain. Entries fire in insertion order. A panicking
/// callback is caught and logged, and the remaining entries in the same poll
/// still fire.
pub struct TimerService<C> {
    entries: Vec<TimerEntry<C>>,
}

impl<C> Default for TimerService<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> TimerService<C> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register a callback firing `interval` after now (and after every
    /// fire, if `repeat`). The callback's return value is a keep-repeating
    /// flag; returning `false` removes the entry even when `repeat` is set.
    pub fn schedule<F>(&mut self, interval: Duration, context: impl Into<String>, repeat: bool, callback: F)
    where
        F: FnMut(&mut C) -> bool + Send + 'static,
    {
        self.entries.push(TimerEntry {
            created_at: Instant::now(),
            interval,
            context: context.into(),
            callback: Box::new(callback),
            repeat,
        });
    }

    /// Fire every due entry, in insertion order.
    pub fn poll(&mut self, now: Instant, ctx: &mut C) {
        let mut i = 0;
        while i < self.entries.len() {
            if !self.entries[i].is_due(now) {
                i += 1;
                continue;
            }

            let entry = &mut self.entries[i];
            match catch_unwind(AssertUnwindSafe(|| (entry.callback)(ctx))) {
                Ok(again) if again && entry.repeat => {
                    entry.created_at = now;
                    i += 1;
                }
                Ok(_) => {
                    self.entries.remove(i);
                }
                Err(_) => {
                    // The callback's state can no longer be trusted.
                    tracing::warn!(context = %entry.context, "timer callback panicked; entry removed");
                    self.entries.remove(i);
                }
            }
        }
    }

    /// Drop every entry without firing it.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
