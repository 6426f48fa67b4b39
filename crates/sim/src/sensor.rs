use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorFault {
    None,
    /// Reading frozen at `value`; no noise is added.
    Stuck { value: f64 },
    Bias { value: f64 },
    /// Offset growing linearly from the moment the fault is injected.
    Drift { per_s: f64 },
    /// Every n-th reading is lost (NaN).
    DropoutEvery { n: u64 },
}

impl SensorFault {
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        match *self {
            SensorFault::None => {}
            SensorFault::Stuck { value } | SensorFault::Bias { value } => {
                if !value.is_finite() {
                    out.push(format!("sensor fault value must be finite (got {value})"));
                }
            }
            SensorFault::Drift { per_s } => {
                if !per_s.is_finite() {
                    out.push(format!("sensor drift rate must be finite (got {per_s})"));
                }
            }
            SensorFault::DropoutEvery { n } => {
                if n == 0 {
                    out.push("sensor dropout period must be at least 1".to_string());
                }
            }
        }
        out
    }
}

#[derive(Clone, Debug)]
pub struct Sensor {
    pub noise_std: f64,
    pub valid_range: (f64, f64),
    fault: SensorFault,
    fault_age_s: f64,
    rng: StdRng,
    step_count: u64,
}

impl Sensor {
    pub fn new(seed: u64, noise_std: f64) -> Self {
        Self {
            noise_std,
            valid_range: (-20.0, 80.0),
            fault: SensorFault::None,
            fault_age_s: 0.0,
            rng: StdRng::seed_from_u64(seed),
            step_count: 0,
        }
    }

    pub fn fault(&self) -> SensorFault {
        self.fault
    }

    pub fn inject_fault(&mut self, fault: SensorFault) {
        self.fault = fault;
        self.fault_age_s = 0.0;
    }

    pub fn clear_fault(&mut self) {
        self.inject_fault(SensorFault::None);
    }

    pub fn read_temp(&mut self, true_temp: f64, dt_s: f64) -> f64 {
        self.step_count += 1;
        self.fault_age_s += dt_s;

        let v = match self.fault {
            SensorFault::None => true_temp,
            SensorFault::Stuck { value } => return value,
            SensorFault::Bias { value } => true_temp + value,
            SensorFault::Drift { per_s } => true_temp + per_s * self.fault_age_s,
            SensorFault::DropoutEvery { n } => {
                if n > 0 && (self.step_count % n) == 0 {
                    return f64::NAN;
                }
                true_temp
            }
        };

        if self.noise_std > 0.0 {
            if let Ok(normal) = Normal::new(0.0, self.noise_std) {
                return v + normal.sample(&mut self.rng);
            }
        }
        v
    }

    pub fn is_valid(&self, value: f64) -> bool {
        if value.is_nan() || !value.is_finite() {
            return false;
        }
        value >= self.valid_range.0 && value <= self.valid_range.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noiseless_sensor_reads_truth() {
        let mut s = Sensor::new(1, 0.0);
        assert_eq!(s.read_temp(22.5, 1.0), 22.5);
    }

    #[test]
    fn same_seed_same_noise() {
        let mut a = Sensor::new(7, 0.2);
        let mut b = Sensor::new(7, 0.2);
        for _ in 0..50 {
            assert_eq!(a.read_temp(22.0, 1.0).to_bits(), b.read_temp(22.0, 1.0).to_bits());
        }
    }

    #[test]
    fn drift_grows_from_injection() {
        let mut s = Sensor::new(1, 0.0);
        s.read_temp(22.0, 1.0);
        s.inject_fault(SensorFault::Drift { per_s: 0.01 });
        let v = s.read_temp(22.0, 10.0);
        assert!((v - 22.1).abs() < 1e-12);
    }

    #[test]
    fn stuck_and_dropout() {
        let mut s = Sensor::new(1, 0.3);
        s.inject_fault(SensorFault::Stuck { value: 21.0 });
        assert_eq!(s.read_temp(30.0, 1.0), 21.0);

        s.inject_fault(SensorFault::DropoutEvery { n: 2 });
        s.noise_std = 0.0;
        let readings: Vec<f64> = (0..4).map(|_| s.read_temp(22.0, 1.0)).collect();
        assert_eq!(readings.iter().filter(|v| v.is_nan()).count(), 2);
        assert!(!s.is_valid(f64::NAN));
    }

    #[test]
    fn fault_parameters_are_checked() {
        assert!(SensorFault::Bias { value: 0.5 }.problems().is_empty());
        assert_eq!(SensorFault::Bias { value: f64::NAN }.problems().len(), 1);
        assert_eq!(SensorFault::Drift { per_s: f64::INFINITY }.problems().len(), 1);
        assert_eq!(SensorFault::DropoutEvery { n: 0 }.problems().len(), 1);
    }
}
