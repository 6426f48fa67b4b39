use std::collections::HashSet;
use std::path::Path;

use alarms::AlarmDefinition;
use controller::{PidConfig, StagingConfig};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use sim::{CracParams, RoomParams};

use crate::error::ConfigError;
use crate::scenario::ScenarioConfig;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub timestep_s: f64,
    pub duration_s: f64,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub count: usize,
    #[serde(default)]
    pub noise_std: f64,
}

/// Everything needed to build a plant. Units are listed in initial roster
/// order: the first leads, the second is lag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlantConfig {
    pub simulation: SimulationConfig,
    pub setpoint_c: f64,
    pub room: RoomParams,
    pub pid: PidConfig,
    pub units: Vec<CracParams>,
    pub staging: StagingConfig,
    pub sensors: SensorConfig,
    #[serde(default)]
    pub alarms: Vec<AlarmDefinition>,
    #[serde(default)]
    pub scenario: Option<ScenarioConfig>,
}

impl PlantConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Apply `path=value` overrides such as `pid.kp=3.0` or
    /// `units[1].cop=3.2`. Values are parsed as YAML scalars, so numbers,
    /// booleans and enum names all work. Keys must already exist.
    pub fn apply_overrides<S: AsRef<str>>(&mut self, overrides: &[S]) -> Result<(), ConfigError> {
        if overrides.is_empty() {
            return Ok(());
        }
        let mut tree = serde_yaml::to_value(&*self)?;
        for entry in overrides {
            let entry = entry.as_ref();
            let (path, raw) = entry.split_once('=').ok_or_else(|| ConfigError::Override {
                entry: entry.to_string(),
                reason: "expected key=value".to_string(),
            })?;
            let value: Value = serde_yaml::from_str(raw.trim())
                .unwrap_or_else(|_| Value::String(raw.trim().to_string()));
            set_path(&mut tree, path.trim(), value).map_err(|reason| ConfigError::Override {
                entry: entry.to_string(),
                reason,
            })?;
        }
        *self = serde_yaml::from_value(tree).map_err(|e| ConfigError::Override {
            entry: overrides
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let sim = &self.simulation;
        if !(sim.timestep_s.is_finite() && sim.timestep_s > 0.0) {
            errors.push(format!("simulation.timestep_s must be > 0 (got {})", sim.timestep_s));
        }
        if !(sim.duration_s.is_finite() && sim.duration_s >= 0.0) {
            errors.push(format!("simulation.duration_s must be >= 0 (got {})", sim.duration_s));
        }
        if !self.setpoint_c.is_finite() {
            errors.push(format!("setpoint_c must be finite (got {})", self.setpoint_c));
        }

        errors.extend(self.room.problems());
        errors.extend(self.pid.problems());
        errors.extend(self.staging.problems());

        if self.units.is_empty() {
            errors.push("at least one cooling unit is required".to_string());
        }
        let mut unit_ids = HashSet::new();
        for unit in &self.units {
            errors.extend(unit.problems());
            if !unit_ids.insert(unit.id.as_str()) {
                errors.push(format!("duplicate unit id '{}'", unit.id));
            }
        }

        if self.sensors.count == 0 {
            errors.push("sensors.count must be at least 1".to_string());
        }
        if !(self.sensors.noise_std.is_finite() && self.sensors.noise_std >= 0.0) {
            errors.push(format!(
                "sensors.noise_std must be >= 0 (got {})",
                self.sensors.noise_std
            ));
        }

        let mut alarm_ids = HashSet::new();
        for alarm in &self.alarms {
            errors.extend(alarm.problems());
            if !alarm_ids.insert(alarm.id.as_str()) {
                errors.push(format!("duplicate alarm id '{}'", alarm.id));
            }
        }

        if let Some(scenario) = &self.scenario {
            errors.extend(scenario.problems());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<Segment<'_>>, String> {
    let mut out = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(i) => (&part[..i], &part[i..]),
            None => (part, ""),
        };
        if key.is_empty() {
            return Err(format!("empty key in '{path}'"));
        }
        out.push(Segment::Key(key));
        while !rest.is_empty() {
            let close = rest
                .find(']')
                .ok_or_else(|| format!("unclosed index in '{part}'"))?;
            let idx = rest[1..close]
                .parse::<usize>()
                .map_err(|_| format!("bad index in '{part}'"))?;
            out.push(Segment::Index(idx));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(format!("unexpected '{rest}' in '{part}'"));
            }
        }
    }
    Ok(out)
}

fn set_path(tree: &mut Value, path: &str, value: Value) -> Result<(), String> {
    let mut node = tree;
    for segment in parse_path(path)? {
        node = match segment {
            Segment::Key(key) => node
                .get_mut(key)
                .ok_or_else(|| format!("unknown key '{key}'"))?,
            Segment::Index(idx) => node
                .get_mut(idx)
                .ok_or_else(|| format!("index {idx} out of range"))?,
        };
    }
    *node = value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use controller::ControlAction;

    use super::*;

    #[test]
    fn presets_are_valid() {
        for cfg in [
            PlantConfig::baseline(),
            PlantConfig::rising_load(),
            PlantConfig::lead_failure(),
        ] {
            cfg.validate().unwrap();
        }
    }

    #[test]
    fn yaml_file_round_trips() {
        let cfg = PlantConfig::lead_failure();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(cfg.to_yaml_string().unwrap().as_bytes())
            .unwrap();
        let loaded = PlantConfig::load(file.path()).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        match PlantConfig::load(&path) {
            Err(ConfigError::Io { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn overrides_reach_nested_fields() {
        let mut cfg = PlantConfig::rising_load();
        cfg.apply_overrides(&[
            "pid.kp=55",
            "units[1].cop=3.2",
            "pid.action=direct",
            "staging.rotation_interval_s=3600",
            "simulation.seed=7",
        ])
        .unwrap();
        assert_eq!(cfg.pid.kp, 55.0);
        assert_eq!(cfg.units[1].cop, 3.2);
        assert_eq!(cfg.pid.action, ControlAction::Direct);
        assert_eq!(cfg.staging.rotation_interval_s, Some(3600.0));
        assert_eq!(cfg.simulation.seed, 7);
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let mut cfg = PlantConfig::baseline();
        for bad in ["pid.kp", "pid.nope=1", "units[9].cop=3", "units[x].cop=3", "pid.kp=fast"] {
            assert!(
                matches!(
                    cfg.apply_overrides(&[bad]),
                    Err(ConfigError::Override { .. })
                ),
                "{bad} accepted"
            );
        }
        assert_eq!(cfg, PlantConfig::baseline());
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut cfg = PlantConfig::rising_load();
        cfg.simulation.timestep_s = 0.0;
        cfg.units[1].id = cfg.units[0].id.clone();
        cfg.staging.destage_error_c = 5.0;
        cfg.sensors.count = 0;
        match cfg.validate() {
            Err(ConfigError::Invalid(problems)) => assert_eq!(problems.len(), 4, "{problems:?}"),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }
}
