use std::io::{self, Write};

use alarms::{AlarmEvent, AlarmSnapshot};
use controller::{PidTerms, SequencerEvent, UnitView};
use serde::Serialize;

use crate::command::Command;
use crate::control_fault::ControlFault;

/// Something that happened during a tick.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PlantEvent {
    Sequencer(SequencerEvent),
    Alarm(AlarmEvent),
    CommandApplied { command: Command },
    CommandRejected { command: Command, reason: String },
    /// No valid sensor reading; the last good measurement is held.
    MeasurementHeld { value_c: f64 },
    ControlFaultExpired { fault: ControlFault },
}

/// Plant state at the end of a tick. A copy: consumers cannot reach back
/// into the clock.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub time_s: f64,
    pub tick: u64,
    pub room_temp_c: f64,
    pub measured_temp_c: f64,
    pub setpoint_c: f64,
    /// Setpoint the controller worked with; differs only under setpoint drift.
    pub control_setpoint_c: f64,
    pub control_fault: ControlFault,
    /// setpoint - measured, the sign convention of the PID terms.
    pub error_c: f64,
    pub pid: PidTerms,
    pub it_load_kw: f64,
    pub units: Vec<UnitView>,
    pub alarms: Vec<AlarmSnapshot>,
    pub total_cooling_kw: f64,
    pub total_power_kw: f64,
    pub cop: Option<f64>,
    pub emergency: bool,
    pub events: Vec<PlantEvent>,
}

impl Snapshot {
    pub fn lead(&self) -> Option<&UnitView> {
        self.units
            .iter()
            .find(|u| u.role == Some(controller::Role::Lead))
    }

    pub fn unit(&self, id: &str) -> Option<&UnitView> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn sequencer_events(&self) -> impl Iterator<Item = &SequencerEvent> {
        self.events.iter().filter_map(|e| match e {
            PlantEvent::Sequencer(ev) => Some(ev),
            _ => None,
        })
    }

    pub fn alarm_events(&self) -> impl Iterator<Item = &AlarmEvent> {
        self.events.iter().filter_map(|e| match e {
            PlantEvent::Alarm(ev) => Some(ev),
            _ => None,
        })
    }
}

pub trait TelemetrySink {
    fn publish(&mut self, snapshot: &Snapshot) -> io::Result<()>;
}

/// One JSON object per line. With `every(n)` only every n-th tick is
/// written, plus any tick that carries events.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    every: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, every: 1 }
    }

    pub fn every(mut self, n: u64) -> Self {
        self.every = n.max(1);
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TelemetrySink for JsonLinesSink<W> {
    fn publish(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        if snapshot.tick % self.every != 0 && snapshot.events.is_empty() {
            return Ok(());
        }
        serde_json::to_writer(&mut self.writer, snapshot)?;
        self.writer.write_all(b"\n")
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    pub snapshots: Vec<Snapshot>,
}

impl TelemetrySink for MemorySink {
    fn publish(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }
}
