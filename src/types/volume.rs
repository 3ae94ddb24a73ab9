//! Rolling one-day volume window.

/// Seconds in one volume window.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Volume spent inside the current one-day window.
///
/// `spent` resets to zero in the same step that advances `window_start`;
/// there is no state in which one has moved without the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VolumeWindow {
    pub spent: u128,
    pub window_start: u64,
}

impl VolumeWindow {
    pub fn new(now: u64) -> Self {
        Self { spent: 0, window_start: now }
    }

    /// True once a day boundary has passed since `window_start`; the
    /// window then carries no spend into `now`.
    pub fn is_expired(self, now: u64) -> bool {
        now >= self.window_start.saturating_add(SECONDS_PER_DAY)
    }

    /// Return the window as it stands at `now`, rolled forward if a day
    /// boundary has been crossed.
    pub fn rolled(self, now: u64) -> Self {
        if self.is_expired(now) {
            Self::new(now)
        } else {
            self
        }
    }

    /// Window after spending `amount` at `now`, or `None` if that would
    /// exceed `cap`.
    pub fn try_spend(self, now: u64, amount: u128, cap: u128) -> Option<Self> {
        let mut window = self.rolled(now);
        let spent = window.spent.checked_add(amount)?;
        if spent > cap {
            return None;
        }
        window.spent = spent;
        Some(window)
    }

    /// Record `amount` without a cap (statistics).
    pub fn record(self, now: u64, amount: u128) -> Self {
        let mut window = self.rolled(now);
        window.spent = window.spent.saturating_add(amount);
        window
    }

    /// Remaining allowance under `cap` at `now`.
    pub fn remaining(self, now: u64, cap: u128) -> u128 {
        cap.saturating_sub(self.rolled(now).spent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spend_within_cap() {
        let w = VolumeWindow::new(1_000);
        let w = w.try_spend(1_100, 400, 1_000).unwrap();
        let w = w.try_spend(1_200, 600, 1_000).unwrap();
        assert_eq!(w.spent, 1_000);
        assert_eq!(w.window_start, 1_000);
        assert!(w.try_spend(1_300, 1, 1_000).is_none());
    }

    #[test]
    fn test_rolls_after_a_day() {
        let w = VolumeWindow { spent: 900, window_start: 1_000 };
        // one second before the boundary: still the old window
        assert_eq!(w.rolled(1_000 + SECONDS_PER_DAY - 1), w);

        assert!(!w.is_expired(1_000 + SECONDS_PER_DAY - 1));
        assert!(w.is_expired(1_000 + SECONDS_PER_DAY));

        let rolled = w.rolled(1_000 + SECONDS_PER_DAY);
        assert_eq!(rolled.spent, 0);
        assert_eq!(rolled.window_start, 1_000 + SECONDS_PER_DAY);
    }

    #[test]
    fn test_remaining() {
        let w = VolumeWindow { spent: 300, window_start: 0 };
        assert_eq!(w.remaining(10, 1_000), 700);
        assert_eq!(w.remaining(SECONDS_PER_DAY, 1_000), 1_000);
    }

    #[test]
    fn test_record_saturates() {
        let w = VolumeWindow { spent: u128::MAX - 1, window_start: 0 };
        assert_eq!(w.record(1, 10).spent, u128::MAX);
    }
}
