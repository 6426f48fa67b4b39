use std::path::PathBuf;

use alarms::AlarmError;
use controller::SequencerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration from {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration at {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid override '{entry}': {reason}")]
    Override { entry: String, reason: String },
    #[error("configuration validation failed:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

/// Why an operator or scheduled command was not applied.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    #[error(transparent)]
    Sequencer(#[from] SequencerError),
    #[error(transparent)]
    Alarm(#[from] AlarmError),
    #[error("unknown sensor {0}")]
    UnknownSensor(usize),
    #[error("{what} must be finite and within range (got {value})")]
    InvalidValue { what: &'static str, value: f64 },
    #[error("invalid {target} fault: {}", .problems.join("; "))]
    InvalidFault {
        target: String,
        problems: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("timestep must be finite and >= 0 (got {0})")]
    InvalidTimestep(f64),
    #[error("failed to build staging sequencer: {0}")]
    Sequencer(#[from] SequencerError),
    #[error("failed to build alarm manager: {0}")]
    Alarm(#[from] AlarmError),
    #[error("telemetry sink failed: {0}")]
    Telemetry(#[from] std::io::Error),
}
