use std::time::{Duration, Instant};

/// Default typing-indicator window.
pub const TYPING_WINDOW: Duration = Duration::from_secs(3);

/// Client-side typing-indicator debounce.
///
/// After a `typing` emission the window suppresses further emissions until it
/// expires with no input, at which point exactly one `typingStop` is due.
/// The server performs no de-duplication of its own; this is the sending
/// client's contract. Pure state machine over caller-supplied instants so it
/// can be driven without timers.
#[derive(Debug)]
pub struct TypingDebounce {
    window: Duration,
    last_keystroke: Option<Instant>,
    emitted_at: Option<Instant>,
}

impl TypingDebounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_keystroke: None,
            emitted_at: None,
        }
    }

    /// Record a keystroke. Returns true if a `typing` event should be emitted
    /// now (first keystroke of a window); false while the window is open.
    pub fn keystroke(&mut self, now: Instant) -> bool {
        self.last_keystroke = Some(now);
        match self.emitted_at {
            Some(at) if now.duration_since(at) < self.window => false,
            _ => {
                self.emitted_at = Some(now);
                true
            }
        }
    }

    /// Poll the window. Returns true exactly once when the window has expired
    /// with no further input, meaning a `typingStop` should be emitted.
    pub fn poll_stop(&mut self, now: Instant) -> bool {
        let (Some(emitted), Some(last)) = (self.emitted_at, self.last_keystroke) else {
            return false;
        };
        let idle = now.duration_since(last) >= self.window;
        let expired = now.duration_since(emitted) >= self.window;
        if idle && expired {
            self.emitted_at = None;
            self.last_keystroke = None;
            true
        } else {
            false
        }
    }

    /// The input was cleared or sent; the window ends immediately.
    /// Returns true if a `typingStop` is owed.
    pub fn reset(&mut self) -> bool {
        let was_open = self.emitted_at.is_some();
        self.emitted_at = None;
        self.last_keystroke = None;
        was_open
    }
}

impl Default for TypingDebounce {
    fn default() -> Self {
        Self::new(TYPING_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_emission_per_window_under_continuous_typing() {
        let mut d = TypingDebounce::new(Duration::from_secs(3));
        let t0 = Instant::now();

        let mut emissions = 0;
        // Keystrokes every 250ms for 10 seconds.
        for i in 0..40 {
            if d.keystroke(t0 + Duration::from_millis(250 * i)) {
                emissions += 1;
            }
        }
        // 10s of typing spans windows starting at 0s, 3s, 6s, 9s.
        assert_eq!(emissions, 4);
    }

    #[test]
    fn stop_fires_once_after_idle_window() {
        let mut d = TypingDebounce::new(Duration::from_secs(3));
        let t0 = Instant::now();
        assert!(d.keystroke(t0));

        assert!(!d.poll_stop(t0 + Duration::from_secs(1)));
        assert!(d.poll_stop(t0 + Duration::from_secs(3)));
        // Already stopped; never double-fires.
        assert!(!d.poll_stop(t0 + Duration::from_secs(4)));
    }

    #[test]
    fn keystroke_mid_window_extends_the_idle_deadline() {
        let mut d = TypingDebounce::new(Duration::from_secs(3));
        let t0 = Instant::now();
        assert!(d.keystroke(t0));
        assert!(!d.keystroke(t0 + Duration::from_secs(2)));

        // 3s after the first emission, but only 1s after the last keystroke.
        assert!(!d.poll_stop(t0 + Duration::from_secs(3)));
        assert!(d.poll_stop(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn reset_on_send_owes_a_stop() {
        let mut d = TypingDebounce::new(Duration::from_secs(3));
        let t0 = Instant::now();
        assert!(d.keystroke(t0));
        assert!(d.reset());
        assert!(!d.reset());

        // A fresh keystroke opens a new window.
        assert!(d.keystroke(t0 + Duration::from_millis(100)));
    }
}
