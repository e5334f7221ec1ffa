use std::time::{Duration, Instant};

/// Tracks user gestures that must win over corrections.
///
/// A correction applied mid-gesture fights the user's own input and
/// shows up as a visible jump, so the engine holds off while a seek is
/// in flight or a scroll happened within the debounce window.
#[derive(Debug)]
pub struct GestureGuard {
    debounce: Duration,
    seeking: bool,
    last_scroll: Option<Instant>,
}

impl GestureGuard {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            seeking: false,
            last_scroll: None,
        }
    }

    /// Marks the start of a user driven seek
    pub fn begin_seek(&mut self) {
        self.seeking = true;
    }

    /// Marks the end of a user driven seek
    pub fn end_seek(&mut self) {
        self.seeking = false;
    }

    /// Records a scroll interaction
    pub fn note_scroll(&mut self) {
        self.note_scroll_at(Instant::now())
    }

    pub fn note_scroll_at(&mut self, now: Instant) {
        self.last_scroll = Some(now);
    }

    /// Returns true if a gesture should suppress corrections right now
    pub fn is_active(&self) -> bool {
        self.is_active_at(Instant::now())
    }

    pub fn is_active_at(&self, now: Instant) -> bool {
        if self.seeking {
            return true;
        }

        self.last_scroll
            .map(|at| now.saturating_duration_since(at) < self.debounce)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_seek_holds_until_released() {
        let mut guard = GestureGuard::new(Duration::from_millis(200));
        let now = Instant::now();

        assert!(!guard.is_active_at(now), "idle guard is inactive");

        guard.begin_seek();
        assert!(
            guard.is_active_at(now + Duration::from_secs(60)),
            "a held seek never expires"
        );

        guard.end_seek();
        assert!(!guard.is_active_at(now), "released seek deactivates");
    }

    #[test]
    fn test_scroll_expires_after_debounce() {
        let mut guard = GestureGuard::new(Duration::from_millis(200));
        let now = Instant::now();

        guard.note_scroll_at(now);
        assert!(
            guard.is_active_at(now + Duration::from_millis(100)),
            "scroll is active within the window"
        );
        assert!(
            !guard.is_active_at(now + Duration::from_millis(200)),
            "scroll expires after the window"
        );
    }
}
