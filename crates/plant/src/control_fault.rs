//! Faults in the control path itself, between the sensors, the PID and the
//! staging sequencer. The plant and the units stay healthy; what goes wrong
//! is what the controls see or what reaches the units.

use std::collections::VecDeque;

use controller::TIME_EPSILON_S;
use serde::{Deserialize, Serialize};

fn default_fallback_fraction() -> f64 {
    0.5
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlFault {
    #[default]
    None,
    /// Link to the units lost for `duration_s`. The units keep the last
    /// delivered demand scaled by `fallback_fraction`; the fault then clears
    /// by itself.
    CommDropout {
        duration_s: f64,
        #[serde(default = "default_fallback_fraction")]
        fallback_fraction: f64,
    },
    /// Demand reaches the units `delay_s` late. Until the first delayed value
    /// arrives the units hold the last delivered demand.
    Deadtime { delay_s: f64 },
    /// The controller's working setpoint creeps away from the configured one
    /// at `rate_c_per_h`, by at most `max_c`.
    SetpointDrift { rate_c_per_h: f64, max_c: f64 },
    /// The controller keeps seeing the measurement from the moment feedback
    /// was lost.
    FeedbackLoss,
}

impl ControlFault {
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        match *self {
            ControlFault::None | ControlFault::FeedbackLoss => {}
            ControlFault::CommDropout {
                duration_s,
                fallback_fraction,
            } => {
                if !(duration_s.is_finite() && duration_s > 0.0) {
                    out.push(format!("comm dropout duration must be > 0 (got {duration_s})"));
                }
                if !(0.0..=1.0).contains(&fallback_fraction) {
                    out.push(format!(
                        "comm dropout fallback fraction must lie within 0..=1 (got {fallback_fraction})"
                    ));
                }
            }
            ControlFault::Deadtime { delay_s } => {
                if !(delay_s.is_finite() && delay_s >= 0.0) {
                    out.push(format!("deadtime must be finite and >= 0 (got {delay_s})"));
                }
            }
            ControlFault::SetpointDrift { rate_c_per_h, max_c } => {
                if !rate_c_per_h.is_finite() {
                    out.push(format!("setpoint drift rate must be finite (got {rate_c_per_h})"));
                }
                if !(max_c.is_finite() && max_c >= 0.0) {
                    out.push(format!("setpoint drift bound must be >= 0 (got {max_c})"));
                }
            }
        }
        out
    }
}

/// State of the control path across ticks. Owned by the clock; only one
/// control fault is active at a time.
#[derive(Clone, Debug, Default)]
pub(crate) struct ControlPath {
    fault: ControlFault,
    age_s: f64,
    delivered_pct: f64,
    fallback_pct: f64,
    frozen_c: Option<f64>,
    in_flight: VecDeque<(f64, f64)>,
}

impl ControlPath {
    pub(crate) fn fault(&self) -> ControlFault {
        self.fault
    }

    /// Replaces any active control fault.
    pub(crate) fn inject(&mut self, fault: ControlFault) {
        self.clear();
        self.fault = fault;
        if let ControlFault::CommDropout {
            fallback_fraction, ..
        } = fault
        {
            self.fallback_pct = self.delivered_pct * fallback_fraction;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.fault = ControlFault::None;
        self.age_s = 0.0;
        self.frozen_c = None;
        self.in_flight.clear();
    }

    /// Measurement as seen by the controls.
    pub(crate) fn feedback(&mut self, measured_c: f64) -> f64 {
        if self.fault != ControlFault::FeedbackLoss {
            return measured_c;
        }
        *self.frozen_c.get_or_insert(measured_c)
    }

    /// Setpoint as seen by the controls.
    pub(crate) fn setpoint(&self, configured_c: f64) -> f64 {
        match self.fault {
            ControlFault::SetpointDrift { rate_c_per_h, max_c } => {
                configured_c + (rate_c_per_h * self.age_s / 3600.0).clamp(-max_c, max_c)
            }
            _ => configured_c,
        }
    }

    /// Demand that actually reaches the units this tick.
    pub(crate) fn deliver(&mut self, demand_pct: f64, now_s: f64) -> f64 {
        let out = match self.fault {
            ControlFault::CommDropout { .. } => self.fallback_pct,
            ControlFault::Deadtime { delay_s } => {
                self.in_flight.push_back((now_s + delay_s, demand_pct));
                let mut out = self.delivered_pct;
                while let Some(&(due_s, pct)) = self.in_flight.front() {
                    if due_s > now_s + TIME_EPSILON_S {
                        break;
                    }
                    out = pct;
                    self.in_flight.pop_front();
                }
                out
            }
            _ => demand_pct,
        };
        self.delivered_pct = out;
        out
    }

    /// Ages the active fault. Returns the fault if it ran out this tick.
    pub(crate) fn advance(&mut self, dt_s: f64) -> Option<ControlFault> {
        if self.fault == ControlFault::None {
            return None;
        }
        self.age_s += dt_s;
        match self.fault {
            ControlFault::CommDropout { duration_s, .. }
                if self.age_s + TIME_EPSILON_S >= duration_s =>
            {
                let expired = self.fault;
                self.clear();
                Some(expired)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropout_holds_fallback_then_expires() {
        let mut path = ControlPath::default();
        assert_eq!(path.deliver(80.0, 0.0), 80.0);
        path.inject(ControlFault::CommDropout {
            duration_s: 3.0,
            fallback_fraction: 0.5,
        });
        for t in 1..=3 {
            assert_eq!(path.deliver(95.0, t as f64), 40.0);
            let expired = path.advance(1.0);
            assert_eq!(expired.is_some(), t == 3);
        }
        assert_eq!(path.deliver(95.0, 4.0), 95.0);
    }

    #[test]
    fn deadtime_delays_demand() {
        let mut path = ControlPath::default();
        path.deliver(50.0, 0.0);
        path.inject(ControlFault::Deadtime { delay_s: 2.0 });
        assert_eq!(path.deliver(60.0, 1.0), 50.0);
        assert_eq!(path.deliver(70.0, 2.0), 50.0);
        assert_eq!(path.deliver(80.0, 3.0), 60.0);
        assert_eq!(path.deliver(90.0, 4.0), 70.0);
        path.clear();
        assert_eq!(path.deliver(90.0, 5.0), 90.0);
    }

    #[test]
    fn drift_is_bounded() {
        let mut path = ControlPath::default();
        path.inject(ControlFault::SetpointDrift {
            rate_c_per_h: -7200.0,
            max_c: 3.0,
        });
        assert_eq!(path.setpoint(22.0), 22.0);
        path.advance(1.0);
        assert_eq!(path.setpoint(22.0), 20.0);
        path.advance(10.0);
        assert_eq!(path.setpoint(22.0), 19.0);
    }

    #[test]
    fn feedback_loss_freezes_first_value() {
        let mut path = ControlPath::default();
        assert_eq!(path.feedback(22.1), 22.1);
        path.inject(ControlFault::FeedbackLoss);
        assert_eq!(path.feedback(22.3), 22.3);
        assert_eq!(path.feedback(24.0), 22.3);
        path.clear();
        assert_eq!(path.feedback(24.0), 24.0);
    }

    #[test]
    fn fault_parameters_are_checked() {
        assert!(ControlFault::Deadtime { delay_s: 30.0 }.problems().is_empty());
        let bad = ControlFault::CommDropout {
            duration_s: f64::NAN,
            fallback_fraction: 2.0,
        };
        assert_eq!(bad.problems().len(), 2);
        let bad = ControlFault::SetpointDrift {
            rate_c_per_h: f64::INFINITY,
            max_c: -1.0,
        };
        assert_eq!(bad.problems().len(), 2);
    }
}
