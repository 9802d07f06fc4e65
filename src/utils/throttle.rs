use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct WindowState {
    window_started_at: Instant,
    suppressed: u64,
}

/// Per-key suppression windows. The first event for a key is let through,
/// repeats within `interval` are counted and dropped.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    windows: Mutex<HashMap<String, WindowState>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            windows: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.windows.lock().expect("throttle mutex poisoned").len()
    }

    /// Returns `Some(suppressed_count)` when an event for `key` should be emitted,
    /// otherwise `None` and the event is counted as suppressed for the active window.
    pub fn should_emit(&self, key: &str) -> Option<u64> {
        if self.interval.is_zero() {
            return Some(0);
        }

        let mut map = self.windows.lock().expect("throttle mutex poisoned");
        let now = Instant::now();

        match map.get_mut(key) {
            Some(state) => {
                if now.duration_since(state.window_started_at) >= self.interval {
                    let suppressed = state.suppressed;
                    state.window_started_at = now;
                    state.suppressed = 0;
                    Some(suppressed)
                } else {
                    state.suppressed += 1;
                    None
                }
            }
            None => {
                // Expired windows have nothing left to suppress.
                let interval = self.interval;
                map.retain(|_, state| now.duration_since(state.window_started_at) < interval);
                map.insert(
                    key.to_string(),
                    WindowState {
                        window_started_at: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
        }
    }
}
