use alarms::{AlarmCondition, AlarmDefinition, AlarmPriority};
use controller::{ControlAction, PidConfig, StagingConfig};
use serde::{Deserialize, Serialize};
use sim::{ActuatorFault, CracParams, RoomParams};

use crate::command::Command;
use crate::config::{PlantConfig, SensorConfig, SimulationConfig};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadProfile {
    /// Linear IT load change between two times. Outside the window the
    /// room keeps whatever load it has.
    Ramp {
        start_s: f64,
        end_s: f64,
        from_kw: f64,
        to_kw: f64,
    },
}

impl LoadProfile {
    pub fn start_s(&self) -> f64 {
        match *self {
            LoadProfile::Ramp { start_s, .. } => start_s,
        }
    }

    pub fn end_s(&self) -> f64 {
        match *self {
            LoadProfile::Ramp { end_s, .. } => end_s,
        }
    }

    pub fn load_at(&self, t_s: f64) -> f64 {
        match *self {
            LoadProfile::Ramp {
                start_s,
                end_s,
                from_kw,
                to_kw,
            } => {
                if t_s <= start_s {
                    from_kw
                } else if t_s >= end_s {
                    to_kw
                } else {
                    from_kw + (to_kw - from_kw) * (t_s - start_s) / (end_s - start_s)
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledCommand {
    pub at_s: f64,
    pub command: Command,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub load: Option<LoadProfile>,
    #[serde(default)]
    pub events: Vec<ScheduledCommand>,
}

impl ScenarioConfig {
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(LoadProfile::Ramp {
            start_s,
            end_s,
            from_kw,
            to_kw,
        }) = self.load
        {
            if !(start_s.is_finite() && end_s.is_finite() && start_s >= 0.0 && end_s > start_s) {
                out.push(format!(
                    "scenario.load ramp needs 0 <= start_s < end_s (got {start_s}..{end_s})"
                ));
            }
            if !(from_kw.is_finite() && to_kw.is_finite() && from_kw >= 0.0 && to_kw >= 0.0) {
                out.push("scenario.load ramp loads must be >= 0".to_string());
            }
        }
        for (i, ev) in self.events.iter().enumerate() {
            if !(ev.at_s.is_finite() && ev.at_s >= 0.0) {
                out.push(format!("scenario.events[{i}].at_s must be >= 0 (got {})", ev.at_s));
            }
            let fault_problems = match &ev.command {
                Command::InjectActuatorFault { fault, .. } => fault.problems(),
                Command::InjectSensorFault { fault, .. } => fault.problems(),
                Command::InjectControlFault { fault } => fault.problems(),
                _ => Vec::new(),
            };
            out.extend(
                fault_problems
                    .into_iter()
                    .map(|p| format!("scenario.events[{i}]: {p}")),
            );
        }
        out
    }
}

fn unit(n: usize, rated_kw: f64) -> CracParams {
    CracParams {
        id: format!("CRAC-{n:02}"),
        rated_kw,
        cop: 3.5,
        startup_s: 30.0,
        shutdown_s: 30.0,
    }
}

fn standard_alarms() -> Vec<AlarmDefinition> {
    vec![
        AlarmDefinition {
            id: "HIGH_TEMP".into(),
            description: "space temperature above setpoint + 2.0 C".into(),
            priority: AlarmPriority::Critical,
            condition: AlarmCondition::HighTemperature {
                above_setpoint_c: 2.0,
            },
            debounce_on_s: 120.0,
            debounce_off_s: 0.0,
            latched: true,
            auto_clear: false,
            escalation_s: None,
        },
        AlarmDefinition {
            id: "LOW_TEMP".into(),
            description: "space temperature below setpoint - 3.0 C".into(),
            priority: AlarmPriority::Medium,
            condition: AlarmCondition::LowTemperature {
                below_setpoint_c: 3.0,
            },
            debounce_on_s: 300.0,
            debounce_off_s: 60.0,
            latched: false,
            auto_clear: true,
            escalation_s: None,
        },
        AlarmDefinition {
            id: "CRAC_FAIL".into(),
            description: "cooling unit failed or commanded without output".into(),
            priority: AlarmPriority::High,
            condition: AlarmCondition::UnitFailure,
            debounce_on_s: 30.0,
            debounce_off_s: 0.0,
            latched: true,
            auto_clear: false,
            escalation_s: Some(300.0),
        },
        AlarmDefinition {
            id: "SENSOR_STUCK".into(),
            description: "temperature sensor reading unchanged".into(),
            priority: AlarmPriority::Medium,
            condition: AlarmCondition::SensorStuck,
            debounce_on_s: 600.0,
            debounce_off_s: 60.0,
            latched: false,
            auto_clear: true,
            escalation_s: None,
        },
        AlarmDefinition {
            id: "CONTROL_ACCURACY".into(),
            description: "space temperature more than 1.0 C from setpoint".into(),
            priority: AlarmPriority::Low,
            condition: AlarmCondition::ControlAccuracy { max_error_c: 1.0 },
            debounce_on_s: 900.0,
            debounce_off_s: 300.0,
            latched: false,
            auto_clear: true,
            escalation_s: None,
        },
        AlarmDefinition {
            id: "LOW_EFFICIENCY".into(),
            description: "aggregate cooling COP below 3.0".into(),
            priority: AlarmPriority::Low,
            condition: AlarmCondition::LowEfficiency { min_cop: 3.0 },
            debounce_on_s: 600.0,
            debounce_off_s: 300.0,
            latched: false,
            auto_clear: true,
            escalation_s: None,
        },
        AlarmDefinition {
            id: "EMERGENCY".into(),
            description: "no cooling unit in service".into(),
            priority: AlarmPriority::Critical,
            condition: AlarmCondition::Emergency,
            debounce_on_s: 0.0,
            debounce_off_s: 0.0,
            latched: true,
            auto_clear: false,
            escalation_s: None,
        },
    ]
}

impl PlantConfig {
    /// One 50 kW lead carrying a steady 40 kW hall at 22 C.
    pub fn baseline() -> Self {
        Self {
            simulation: SimulationConfig {
                timestep_s: 1.0,
                duration_s: 7200.0,
                seed: 12345,
            },
            setpoint_c: 22.0,
            room: RoomParams {
                initial_temp_c: 22.0,
                ambient_temp_c: 22.0,
                thermal_mass_kj_per_c: 2500.0,
                ua_kw_per_c: 0.25,
                it_load_kw: 40.0,
            },
            pid: PidConfig {
                kp: 80.0,
                ki: 0.5,
                kd: 0.0,
                out_min: 0.0,
                out_max: 100.0,
                action: ControlAction::Reverse,
                rate_limit_pct_per_s: None,
                anti_windup: true,
            },
            units: vec![unit(1, 50.0)],
            staging: StagingConfig {
                min_lead_pct: 20.0,
                stage_error_c: 0.8,
                stage_error_dwell_s: 120.0,
                stage_capacity_pct: 90.0,
                stage_capacity_dwell_s: 300.0,
                destage_error_c: -0.3,
                destage_capacity_pct: 40.0,
                destage_dwell_s: 300.0,
                min_on_s: 300.0,
                min_off_s: 180.0,
                fail_timeout_s: 60.0,
                rotation_interval_s: None,
                rotation_deadband_c: 0.2,
            },
            sensors: SensorConfig {
                count: 3,
                noise_std: 0.03,
            },
            alarms: standard_alarms(),
            scenario: None,
        }
    }

    /// Lead plus lag while the IT load climbs from 35 to 70 kW over ten
    /// minutes, pushing the lead past its capacity.
    pub fn rising_load() -> Self {
        let mut cfg = Self::baseline();
        cfg.simulation.duration_s = 1800.0;
        cfg.room.it_load_kw = 35.0;
        cfg.units = vec![unit(1, 50.0), unit(2, 50.0)];
        cfg.scenario = Some(ScenarioConfig {
            load: Some(LoadProfile::Ramp {
                start_s: 300.0,
                end_s: 900.0,
                from_kw: 35.0,
                to_kw: 70.0,
            }),
            events: Vec::new(),
        });
        cfg
    }

    /// Three units; the lead's compressor stops delivering at five minutes
    /// while it stays commanded.
    pub fn lead_failure() -> Self {
        let mut cfg = Self::baseline();
        cfg.simulation.duration_s = 1800.0;
        cfg.units = vec![unit(1, 50.0), unit(2, 50.0), unit(3, 50.0)];
        cfg.scenario = Some(ScenarioConfig {
            load: None,
            events: vec![ScheduledCommand {
                at_s: 300.0,
                command: Command::InjectActuatorFault {
                    unit: "CRAC-01".into(),
                    fault: ActuatorFault::NoOutput,
                },
            }],
        });
        cfg
    }
}
