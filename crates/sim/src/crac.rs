use serde::{Deserialize, Serialize};

/// Flat status label of a unit, as published in telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Off,
    Starting,
    Running,
    Stopping,
    Failed,
    Maintenance,
}

/// Lifecycle of a unit. Transition progress lives inside the variant that
/// needs it, so a stopped unit cannot carry a stale startup timer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UnitState {
    Off,
    Starting { elapsed_s: f64 },
    Running,
    Stopping { elapsed_s: f64 },
    Failed,
    Maintenance,
}

impl UnitState {
    pub fn status(&self) -> UnitStatus {
        match self {
            UnitState::Off => UnitStatus::Off,
            UnitState::Starting { .. } => UnitStatus::Starting,
            UnitState::Running => UnitStatus::Running,
            UnitState::Stopping { .. } => UnitStatus::Stopping,
            UnitState::Failed => UnitStatus::Failed,
            UnitState::Maintenance => UnitStatus::Maintenance,
        }
    }
}

/// Injected actuator/compressor faults. They only alter what the unit
/// delivers; the commanded value stays visible to the controls.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActuatorFault {
    None,
    /// Commanded and running, but no cooling reaches the room.
    NoOutput,
    /// Capacity actuator frozen at a fixed position (%).
    Stuck { pct: f64 },
    /// Reduced capacity, `factor` in 0..=1.
    Derate { factor: f64 },
    /// Position only follows the command once the gap exceeds the breakaway.
    Stiction { breakaway_pct: f64 },
}

impl ActuatorFault {
    /// Out-of-range or non-finite parameters. A fault with problems must not
    /// reach a unit.
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        match *self {
            ActuatorFault::None | ActuatorFault::NoOutput => {}
            ActuatorFault::Stuck { pct } => {
                if !(0.0..=100.0).contains(&pct) {
                    out.push(format!("stuck position must lie within 0..=100 (got {pct})"));
                }
            }
            ActuatorFault::Derate { factor } => {
                if !(0.0..=1.0).contains(&factor) {
                    out.push(format!("derate factor must lie within 0..=1 (got {factor})"));
                }
            }
            ActuatorFault::Stiction { breakaway_pct } => {
                if !(0.0..=100.0).contains(&breakaway_pct) {
                    out.push(format!(
                        "stiction breakaway must lie within 0..=100 (got {breakaway_pct})"
                    ));
                }
            }
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CracParams {
    pub id: String,
    pub rated_kw: f64,
    pub cop: f64,
    #[serde(default)]
    pub startup_s: f64,
    #[serde(default)]
    pub shutdown_s: f64,
}

impl CracParams {
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.id.trim().is_empty() {
            out.push("unit id must not be empty".to_string());
        }
        if !(self.rated_kw.is_finite() && self.rated_kw > 0.0) {
            out.push(format!("unit {}: rated_kw must be > 0 (got {})", self.id, self.rated_kw));
        }
        if !(self.cop.is_finite() && self.cop > 0.0) {
            out.push(format!("unit {}: cop must be > 0 (got {})", self.id, self.cop));
        }
        for (name, v) in [("startup_s", self.startup_s), ("shutdown_s", self.shutdown_s)] {
            if !(v.is_finite() && v >= 0.0) {
                out.push(format!("unit {}: {name} must be >= 0 (got {v})", self.id));
            }
        }
        out
    }
}

#[derive(Clone, Debug)]
pub struct CracUnit {
    params: CracParams,
    state: UnitState,
    command_pct: f64,
    position_pct: f64,
    output_kw: f64,
    power_kw: f64,
    fault: ActuatorFault,
    starts: u32,
    run_time_s: f64,
    energy_kwh: f64,
}

impl CracUnit {
    pub fn new(params: CracParams) -> Self {
        Self {
            params,
            state: UnitState::Off,
            command_pct: 0.0,
            position_pct: 0.0,
            output_kw: 0.0,
            power_kw: 0.0,
            fault: ActuatorFault::None,
            starts: 0,
            run_time_s: 0.0,
            energy_kwh: 0.0,
        }
    }

    pub fn id(&self) -> &str {
        &self.params.id
    }

    pub fn params(&self) -> &CracParams {
        &self.params
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn status(&self) -> UnitStatus {
        self.state.status()
    }

    pub fn command_pct(&self) -> f64 {
        self.command_pct
    }

    pub fn output_kw(&self) -> f64 {
        self.output_kw
    }

    pub fn power_kw(&self) -> f64 {
        self.power_kw
    }

    pub fn fault(&self) -> ActuatorFault {
        self.fault
    }

    pub fn starts(&self) -> u32 {
        self.starts
    }

    pub fn run_time_s(&self) -> f64 {
        self.run_time_s
    }

    pub fn energy_kwh(&self) -> f64 {
        self.energy_kwh
    }

    /// Not failed and not held for maintenance.
    pub fn is_in_service(&self) -> bool {
        !matches!(self.state, UnitState::Failed | UnitState::Maintenance)
    }

    /// Starting or running, i.e. expected to deliver cooling.
    pub fn is_active(&self) -> bool {
        matches!(self.state, UnitState::Starting { .. } | UnitState::Running)
    }

    /// Commands outside 0..=100 are clamped; NaN is treated as 0.
    pub fn set_command(&mut self, pct: f64) {
        self.command_pct = if pct.is_nan() { 0.0 } else { pct.clamp(0.0, 100.0) };
    }

    pub fn start(&mut self) -> bool {
        match self.state {
            UnitState::Off | UnitState::Stopping { .. } => {
                self.state = UnitState::Starting { elapsed_s: 0.0 };
                self.starts += 1;
                true
            }
            _ => false,
        }
    }

    pub fn stop(&mut self) -> bool {
        match self.state {
            UnitState::Starting { .. } | UnitState::Running => {
                self.state = UnitState::Stopping { elapsed_s: 0.0 };
                true
            }
            _ => false,
        }
    }

    pub fn fail(&mut self) -> bool {
        if self.state == UnitState::Failed {
            return false;
        }
        self.state = UnitState::Failed;
        self.drop_output();
        true
    }

    pub fn enter_maintenance(&mut self) -> bool {
        if self.state == UnitState::Maintenance {
            return false;
        }
        self.state = UnitState::Maintenance;
        self.drop_output();
        true
    }

    /// Repair or release from maintenance. The unit comes back Off with any
    /// injected fault removed.
    pub fn return_to_service(&mut self) -> bool {
        match self.state {
            UnitState::Failed | UnitState::Maintenance => {
                self.state = UnitState::Off;
                self.fault = ActuatorFault::None;
                true
            }
            _ => false,
        }
    }

    pub fn inject_fault(&mut self, fault: ActuatorFault) {
        self.fault = fault;
    }

    pub fn clear_fault(&mut self) {
        self.fault = ActuatorFault::None;
    }

    fn drop_output(&mut self) {
        self.command_pct = 0.0;
        self.output_kw = 0.0;
        self.power_kw = 0.0;
    }

    /// Advance transitions by `dt_s` and recompute delivered cooling and
    /// electrical draw for this step.
    pub fn step(&mut self, dt_s: f64) {
        self.state = match self.state {
            UnitState::Starting { elapsed_s } => {
                let elapsed_s = elapsed_s + dt_s;
                if elapsed_s >= self.params.startup_s {
                    UnitState::Running
                } else {
                    UnitState::Starting { elapsed_s }
                }
            }
            UnitState::Stopping { elapsed_s } => {
                let elapsed_s = elapsed_s + dt_s;
                if elapsed_s >= self.params.shutdown_s {
                    UnitState::Off
                } else {
                    UnitState::Stopping { elapsed_s }
                }
            }
            other => other,
        };

        self.position_pct = match self.fault {
            ActuatorFault::Stuck { pct } => pct.clamp(0.0, 100.0),
            ActuatorFault::Stiction { breakaway_pct } => {
                if (self.command_pct - self.position_pct).abs() > breakaway_pct {
                    self.command_pct
                } else {
                    self.position_pct
                }
            }
            _ => self.command_pct,
        };

        let availability = match self.state {
            UnitState::Running => 1.0,
            UnitState::Starting { elapsed_s } if self.params.startup_s > 0.0 => {
                (elapsed_s / self.params.startup_s).clamp(0.0, 1.0)
            }
            _ => 0.0,
        };
        let capacity = match self.fault {
            ActuatorFault::NoOutput => 0.0,
            ActuatorFault::Derate { factor } => factor.clamp(0.0, 1.0),
            _ => 1.0,
        };

        self.output_kw = self.params.rated_kw * (self.position_pct / 100.0) * availability * capacity;
        self.power_kw = if self.output_kw > 0.0 {
            self.output_kw / self.params.cop
        } else {
            0.0
        };

        if self.state == UnitState::Running {
            self.run_time_s += dt_s;
        }
        self.energy_kwh += self.power_kw * dt_s / 3600.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(startup_s: f64) -> CracUnit {
        CracUnit::new(CracParams {
            id: "CRAC-01".into(),
            rated_kw: 50.0,
            cop: 3.5,
            startup_s,
            shutdown_s: 10.0,
        })
    }

    #[test]
    fn output_and_power_follow_command() {
        let mut u = unit(0.0);
        assert!(u.start());
        u.set_command(80.0);
        u.step(1.0);
        assert_eq!(u.status(), UnitStatus::Running);
        assert!((u.output_kw() - 40.0).abs() < 1e-12);
        assert!((u.power_kw() - 40.0 / 3.5).abs() < 1e-12);
    }

    #[test]
    fn command_is_clamped() {
        let mut u = unit(0.0);
        u.set_command(150.0);
        assert_eq!(u.command_pct(), 100.0);
        u.set_command(-3.0);
        assert_eq!(u.command_pct(), 0.0);
        u.set_command(f64::NAN);
        assert_eq!(u.command_pct(), 0.0);
    }

    #[test]
    fn startup_ramps_then_runs() {
        let mut u = unit(10.0);
        u.start();
        u.set_command(100.0);
        u.step(5.0);
        assert_eq!(u.status(), UnitStatus::Starting);
        assert!((u.output_kw() - 25.0).abs() < 1e-12);
        u.step(5.0);
        assert_eq!(u.status(), UnitStatus::Running);
        assert!((u.output_kw() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn stopping_unit_delivers_nothing_and_ends_off() {
        let mut u = unit(0.0);
        u.start();
        u.set_command(50.0);
        u.step(1.0);
        assert!(u.stop());
        u.step(5.0);
        assert_eq!(u.status(), UnitStatus::Stopping);
        assert_eq!(u.output_kw(), 0.0);
        u.step(5.0);
        assert_eq!(u.status(), UnitStatus::Off);
    }

    #[test]
    fn no_output_fault_keeps_status_running() {
        let mut u = unit(0.0);
        u.start();
        u.set_command(60.0);
        u.inject_fault(ActuatorFault::NoOutput);
        u.step(1.0);
        assert_eq!(u.status(), UnitStatus::Running);
        assert_eq!(u.command_pct(), 60.0);
        assert_eq!(u.output_kw(), 0.0);
        assert_eq!(u.power_kw(), 0.0);
    }

    #[test]
    fn stiction_ignores_small_moves() {
        let mut u = unit(0.0);
        u.start();
        u.inject_fault(ActuatorFault::Stiction { breakaway_pct: 5.0 });
        u.set_command(50.0);
        u.step(1.0);
        assert!((u.output_kw() - 25.0).abs() < 1e-12);
        u.set_command(53.0);
        u.step(1.0);
        assert!((u.output_kw() - 25.0).abs() < 1e-12);
        u.set_command(60.0);
        u.step(1.0);
        assert!((u.output_kw() - 30.0).abs() < 1e-12);
    }

    #[test]
    fn fault_parameters_are_checked() {
        assert!(ActuatorFault::NoOutput.problems().is_empty());
        assert!(ActuatorFault::Derate { factor: 0.5 }.problems().is_empty());
        for bad in [
            ActuatorFault::Derate { factor: f64::NAN },
            ActuatorFault::Derate { factor: 1.5 },
            ActuatorFault::Stuck { pct: f64::NAN },
            ActuatorFault::Stuck { pct: -1.0 },
            ActuatorFault::Stiction {
                breakaway_pct: f64::INFINITY,
            },
        ] {
            assert_eq!(bad.problems().len(), 1, "{bad:?}");
        }
    }

    #[test]
    fn failure_and_repair() {
        let mut u = unit(0.0);
        u.start();
        u.set_command(70.0);
        u.step(1.0);
        assert!(u.fail());
        assert!(!u.is_in_service());
        assert_eq!(u.command_pct(), 0.0);
        assert!(!u.start());
        assert!(u.return_to_service());
        assert_eq!(u.status(), UnitStatus::Off);
        assert_eq!(u.fault(), ActuatorFault::None);
    }
}
