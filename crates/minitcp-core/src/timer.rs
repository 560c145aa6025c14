//! Retransmission timer.
//!
//! The timer never looks at a clock. The owner reports elapsed time through
//! [`RetransmitTimer::advance`], which is the only way the timer moves
//! towards expiry.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Stopped,
    Running { elapsed_ms: u64 },
    Expired,
}

/// Countdown for the oldest outstanding segment, with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    initial_rto_ms: u64,
    rto_ms: u64,
    state: TimerState,
}

impl RetransmitTimer {
    pub fn new(initial_rto_ms: u64) -> Self {
        Self {
            initial_rto_ms,
            rto_ms: initial_rto_ms,
            state: TimerState::Stopped,
        }
    }

    /// Current timeout in milliseconds.
    pub fn rto_ms(&self) -> u64 {
        self.rto_ms
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    pub fn is_expired(&self) -> bool {
        self.state == TimerState::Expired
    }

    /// Start counting from zero against the current timeout.
    pub fn start(&mut self) {
        self.state = TimerState::Running { elapsed_ms: 0 };
    }

    pub fn stop(&mut self) {
        self.state = TimerState::Stopped;
    }

    /// Double the timeout. Takes effect from the next `start`.
    pub fn back_off(&mut self) {
        self.rto_ms = self.rto_ms.saturating_mul(2);
    }

    /// Return the timeout to its initial value.
    pub fn reset_rto(&mut self) {
        self.rto_ms = self.initial_rto_ms;
    }

    /// Account for `ms` of elapsed time. Returns true if this call made the
    /// timer expire.
    pub fn advance(&mut self, ms: u64) -> bool {
        let TimerState::Running { elapsed_ms } = self.state else {
            return false;
        };
        let elapsed_ms = elapsed_ms.saturating_add(ms);
        if elapsed_ms >= self.rto_ms {
            self.state = TimerState::Expired;
            true
        } else {
            self.state = TimerState::Running { elapsed_ms };
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_exactly_at_rto() {
        let mut timer = RetransmitTimer::new(100);
        assert!(!timer.advance(1000));

        timer.start();
        assert!(!timer.advance(60));
        assert!(!timer.advance(39));
        assert!(timer.advance(1));
        assert!(timer.is_expired());
        assert!(!timer.is_running());
        // Stays expired without firing again.
        assert!(!timer.advance(500));
    }

    #[test]
    fn back_off_and_reset() {
        let mut timer = RetransmitTimer::new(50);
        timer.back_off();
        timer.back_off();
        assert_eq!(timer.rto_ms(), 200);

        timer.start();
        assert!(!timer.advance(199));
        timer.reset_rto();
        assert!(timer.advance(0));
        assert_eq!(timer.rto_ms(), 50);
    }

    #[test]
    fn stop_discards_progress() {
        let mut timer = RetransmitTimer::new(10);
        timer.start();
        timer.advance(9);
        timer.stop();
        timer.start();
        assert!(!timer.advance(9));
    }
}
