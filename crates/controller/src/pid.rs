use serde::{Deserialize, Serialize};

/// Direct action raises output when the measurement is below setpoint
/// (heating). Reverse action raises it when the measurement is above
/// (cooling).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    #[default]
    Direct,
    Reverse,
}

impl ControlAction {
    fn sign(self) -> f64 {
        match self {
            ControlAction::Direct => 1.0,
            ControlAction::Reverse => -1.0,
        }
    }
}

fn default_out_min() -> f64 {
    0.0
}

fn default_out_max() -> f64 {
    100.0
}

fn default_anti_windup() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    #[serde(default = "default_out_min")]
    pub out_min: f64,
    #[serde(default = "default_out_max")]
    pub out_max: f64,
    #[serde(default)]
    pub action: ControlAction,
    /// Maximum output slew in %/s.
    #[serde(default)]
    pub rate_limit_pct_per_s: Option<f64>,
    #[serde(default = "default_anti_windup")]
    pub anti_windup: bool,
}

impl PidConfig {
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, v) in [("pid.kp", self.kp), ("pid.ki", self.ki), ("pid.kd", self.kd)] {
            if !(v.is_finite() && v >= 0.0) {
                out.push(format!("{name} must be finite and >= 0 (got {v})"));
            }
        }
        if !(self.out_min.is_finite() && self.out_max.is_finite() && self.out_min < self.out_max) {
            out.push(format!(
                "pid output limits must satisfy out_min < out_max (got {}..{})",
                self.out_min, self.out_max
            ));
        } else if self.out_min < 0.0 || self.out_max > 100.0 {
            out.push("pid output limits must lie within 0..=100".to_string());
        }
        if let Some(r) = self.rate_limit_pct_per_s {
            if !(r.is_finite() && r > 0.0) {
                out.push(format!("pid.rate_limit_pct_per_s must be > 0 (got {r})"));
            }
        }
        out
    }
}

/// Terms of the most recent update, kept for telemetry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PidTerms {
    /// setpoint - measured
    pub error: f64,
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub output: f64,
}

#[derive(Clone, Debug)]
pub struct PidController {
    cfg: PidConfig,
    integral: f64,
    prev_measurement: Option<f64>,
    prev_output: Option<f64>,
    last: PidTerms,
}

impl PidController {
    pub fn new(cfg: PidConfig) -> Self {
        Self {
            cfg,
            integral: 0.0,
            prev_measurement: None,
            prev_output: None,
            last: PidTerms::default(),
        }
    }

    pub fn config(&self) -> &PidConfig {
        &self.cfg
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_measurement = None;
        self.prev_output = None;
        self.last = PidTerms::default();
    }

    /// Integral contribution in output units (sum of Ki * e * dt).
    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn last_terms(&self) -> PidTerms {
        self.last
    }

    /// Returns the demand in `[out_min, out_max]`.
    ///
    /// The integral only accumulates while the unclamped output is not
    /// already saturated in the direction the error pushes it. The derivative
    /// acts on the measurement so setpoint steps do not kick the output.
    /// Callers must pass `dt_s > 0`.
    pub fn compute(&mut self, setpoint: f64, measured: f64, dt_s: f64) -> f64 {
        debug_assert!(dt_s > 0.0, "pid step with non-positive dt {dt_s}");
        debug_assert!(measured.is_finite(), "pid fed a non-finite measurement");
        if !measured.is_finite() || !setpoint.is_finite() {
            return self.prev_output.unwrap_or(self.cfg.out_min);
        }

        let sign = self.cfg.action.sign();
        let error = setpoint - measured;
        let e = sign * error;

        let p = self.cfg.kp * e;
        let d = match self.prev_measurement {
            Some(prev) if dt_s > 0.0 => -sign * self.cfg.kd * (measured - prev) / dt_s,
            _ => 0.0,
        };

        let unclamped = p + self.integral + d;
        let winding_up = (unclamped >= self.cfg.out_max && e > 0.0)
            || (unclamped <= self.cfg.out_min && e < 0.0);
        if !(self.cfg.anti_windup && winding_up) {
            self.integral += self.cfg.ki * e * dt_s;
        }

        let mut out = (p + self.integral + d).clamp(self.cfg.out_min, self.cfg.out_max);
        if let (Some(limit), Some(prev)) = (self.cfg.rate_limit_pct_per_s, self.prev_output) {
            let max_step = limit * dt_s;
            out = out.clamp(prev - max_step, prev + max_step);
        }

        self.prev_measurement = Some(measured);
        self.prev_output = Some(out);
        self.last = PidTerms {
            error,
            p,
            i: self.integral,
            d,
            output: out,
        };
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(kp: f64, ki: f64, kd: f64) -> PidConfig {
        PidConfig {
            kp,
            ki,
            kd,
            out_min: 0.0,
            out_max: 100.0,
            action: ControlAction::Direct,
            rate_limit_pct_per_s: None,
            anti_windup: true,
        }
    }

    #[test]
    fn proportional_only_is_exact_for_any_dt() {
        for dt in [0.01, 0.5, 1.0, 30.0] {
            let mut pid = PidController::new(cfg(7.5, 0.0, 0.0));
            for _ in 0..10 {
                let out = pid.compute(25.0, 22.0, dt);
                assert_eq!(out, 7.5 * 3.0);
            }
            let mut sat = PidController::new(cfg(50.0, 0.0, 0.0));
            assert_eq!(sat.compute(25.0, 22.0, dt), 100.0);
        }
    }

    #[test]
    fn reverse_action_cools_when_warm() {
        let mut c = cfg(10.0, 0.0, 0.0);
        c.action = ControlAction::Reverse;
        let mut pid = PidController::new(c);
        assert_eq!(pid.compute(22.0, 24.0, 1.0), 20.0);
        assert_eq!(pid.last_terms().error, -2.0);
        assert_eq!(pid.compute(22.0, 21.0, 1.0), 0.0);
    }

    #[test]
    fn integral_freezes_while_saturated() {
        let mut pid = PidController::new(cfg(10.0, 1.0, 0.0));
        for _ in 0..1000 {
            assert_eq!(pid.compute(30.0, 20.0, 1.0), 100.0);
        }
        // P alone is already at the limit, so nothing is integrated
        assert_eq!(pid.integral(), 0.0);

        let mut naive = cfg(10.0, 1.0, 0.0);
        naive.anti_windup = false;
        let mut naive = PidController::new(naive);
        for _ in 0..1000 {
            naive.compute(30.0, 20.0, 1.0);
        }
        assert_eq!(naive.integral(), 10_000.0);
    }

    #[test]
    fn integral_unwinds_when_error_reverses() {
        let mut pid = PidController::new(cfg(1.0, 1.0, 0.0));
        for _ in 0..200 {
            pid.compute(23.0, 22.0, 1.0);
        }
        let held = pid.integral();
        assert!(held <= 100.0);
        pid.compute(21.0, 22.0, 1.0);
        assert!(pid.integral() < held);
    }

    #[test]
    fn derivative_ignores_setpoint_steps() {
        let mut pid = PidController::new(cfg(0.0, 0.0, 5.0));
        pid.compute(20.0, 22.0, 1.0);
        assert_eq!(pid.compute(40.0, 22.0, 1.0), 0.0);
        assert_eq!(pid.last_terms().d, 0.0);
        // falling measurement with direct action pushes output up
        assert_eq!(pid.compute(40.0, 21.0, 1.0), 5.0);
    }

    #[test]
    fn rate_limit_bounds_slew() {
        let mut c = cfg(100.0, 0.0, 0.0);
        c.rate_limit_pct_per_s = Some(10.0);
        let mut pid = PidController::new(c);
        assert_eq!(pid.compute(22.0, 22.0, 1.0), 0.0);
        assert_eq!(pid.compute(30.0, 22.0, 1.0), 10.0);
        assert_eq!(pid.compute(30.0, 22.0, 2.0), 30.0);
    }

    #[test]
    fn config_problems_are_collected() {
        let mut c = cfg(-1.0, 0.0, 0.0);
        c.out_min = 50.0;
        c.out_max = 10.0;
        assert_eq!(c.problems().len(), 2);
    }
}
