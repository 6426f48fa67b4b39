//! Edge-triggered dwell timer shared by staging, failure detection and alarm
//! debounce.
//!
//! The timer is armed at zero on the first step its condition is seen true
//! and accumulates simulated time only while the condition keeps holding.
//! Expiry is a separate query (`held_for`), so arming never implies expiry.

/// Slack for comparing accumulated float time against a dwell.
pub const TIME_EPSILON_S: f64 = 1e-9;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EdgeTimer {
    armed: bool,
    elapsed_s: f64,
}

impl EdgeTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed this step's condition. Returns the time the condition has held.
    pub fn update(&mut self, condition: bool, dt_s: f64) -> f64 {
        if !condition {
            self.reset();
        } else if self.armed {
            self.elapsed_s += dt_s;
        } else {
            self.armed = true;
            self.elapsed_s = 0.0;
        }
        self.elapsed_s
    }

    /// True once the condition has held continuously for at least `dwell_s`.
    pub fn held_for(&self, dwell_s: f64) -> bool {
        self.armed && self.elapsed_s + TIME_EPSILON_S >= dwell_s
    }

    pub fn reset(&mut self) {
        self.armed = false;
        self.elapsed_s = 0.0;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn elapsed_s(&self) -> f64 {
        self.elapsed_s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arming_does_not_expire_a_nonzero_dwell() {
        let mut t = EdgeTimer::new();
        t.update(true, 1.0);
        assert!(t.is_armed());
        assert!(!t.held_for(60.0));
        assert!(t.held_for(0.0));
    }

    #[test]
    fn expires_exactly_after_dwell() {
        let mut t = EdgeTimer::new();
        let mut fired_at = None;
        for k in 0..200u32 {
            t.update(true, 1.0);
            if fired_at.is_none() && t.held_for(60.0) {
                fired_at = Some(k);
            }
        }
        assert_eq!(fired_at, Some(60));
    }

    #[test]
    fn false_step_resets() {
        let mut t = EdgeTimer::new();
        for _ in 0..50 {
            t.update(true, 1.0);
        }
        t.update(false, 1.0);
        assert!(!t.is_armed());
        assert_eq!(t.elapsed_s(), 0.0);
        // re-armed at zero, so 61 true steps are needed for a 60 s dwell
        for _ in 0..60 {
            t.update(true, 1.0);
        }
        assert!(!t.held_for(60.0));
        t.update(true, 1.0);
        assert!(t.held_for(60.0));
    }

    #[test]
    fn fractional_steps_accumulate_within_tolerance() {
        let mut t = EdgeTimer::new();
        t.update(true, 0.1);
        for _ in 0..600 {
            t.update(true, 0.1);
        }
        assert!(t.held_for(60.0));
    }
}
