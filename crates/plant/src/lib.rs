//! The cooling plant as a whole: configuration, the command queue, the
//! fixed-timestep clock that drives every component, and telemetry.

mod clock;
mod command;
mod config;
mod control_fault;
mod error;
mod scenario;
mod telemetry;

pub use clock::{RunSummary, SimulationClock};
pub use command::{Command, CommandSender, StopHandle};
pub use config::{PlantConfig, SensorConfig, SimulationConfig};
pub use control_fault::ControlFault;
pub use error::{CommandError, ConfigError, SimError};
pub use scenario::{LoadProfile, ScenarioConfig, ScheduledCommand};
pub use telemetry::{JsonLinesSink, MemorySink, PlantEvent, Snapshot, TelemetrySink};
