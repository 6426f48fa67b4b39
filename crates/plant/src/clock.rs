//! Fixed-timestep driver that owns the whole plant.
//!
//! Per tick, in this order: scenario load and due scheduled commands, queued
//! operator commands, sensor read, PID, staging sequencer (which advances the
//! units), room heat balance, alarms, snapshot. An injected control fault
//! sits between the sensors, the PID and the sequencer; alarms always see
//! the real measurement and setpoint.

use alarms::{AlarmEvent, AlarmEventKind, AlarmInputs, AlarmManager};
use controller::{PidController, SequencerEvent, StagingSequencer, TIME_EPSILON_S};
use serde::Serialize;
use sim::{CracUnit, Room, Sensor, UnitStatus};
use tracing::{debug, info, warn};

use crate::command::{Command, CommandSender, StopHandle};
use crate::config::PlantConfig;
use crate::control_fault::ControlPath;
use crate::error::{CommandError, SimError};
use crate::scenario::{LoadProfile, ScheduledCommand};
use crate::telemetry::{PlantEvent, Snapshot, TelemetrySink};

const NO_OUTPUT_KW: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub duration_s: f64,
    pub stopped_early: bool,
    pub final_temp_c: f64,
    pub max_temp_c: f64,
    pub min_temp_c: f64,
    pub mean_abs_error_c: f64,
    pub first_lag_stage_s: Option<f64>,
    pub alarms_raised: u32,
    pub cooling_energy_kwh: f64,
    pub electrical_energy_kwh: f64,
    pub it_energy_kwh: f64,
}

#[derive(Clone, Debug)]
struct RunStats {
    max_temp_c: f64,
    min_temp_c: f64,
    abs_error_sum: f64,
    first_lag_stage_s: Option<f64>,
    alarms_raised: u32,
    stopped_early: bool,
}

pub struct SimulationClock {
    config: PlantConfig,
    room: Room,
    sensors: Vec<Sensor>,
    last_readings: Vec<Option<f64>>,
    last_truth_c: Option<f64>,
    control: ControlPath,
    pid: PidController,
    sequencer: StagingSequencer,
    alarms: AlarmManager,
    commands: CommandSender,
    stop: StopHandle,
    schedule: Vec<ScheduledCommand>,
    next_scheduled: usize,
    load_profile: Option<LoadProfile>,
    setpoint_c: f64,
    control_setpoint_c: f64,
    measured_c: f64,
    time_s: f64,
    tick: u64,
    stats: RunStats,
    last: Snapshot,
}

fn sensor_seed(seed: u64, index: usize) -> u64 {
    seed ^ (0xA1 + 0x11 * index as u64)
}

impl SimulationClock {
    /// Validates the configuration and builds every component. Nothing runs
    /// until the first tick.
    pub fn new(config: PlantConfig) -> Result<Self, SimError> {
        config.validate()?;

        let room = Room::new(&config.room);
        let sensors: Vec<Sensor> = (0..config.sensors.count)
            .map(|i| Sensor::new(sensor_seed(config.simulation.seed, i), config.sensors.noise_std))
            .collect();
        let units = config.units.iter().cloned().map(CracUnit::new).collect();
        let sequencer = StagingSequencer::new(units, config.staging.clone())?;
        let alarms = AlarmManager::new(config.alarms.clone())?;

        let (mut schedule, load_profile) = match &config.scenario {
            Some(s) => (s.events.clone(), s.load.clone()),
            None => (Vec::new(), None),
        };
        schedule.sort_by(|a, b| a.at_s.total_cmp(&b.at_s));

        info!(
            units = config.units.len(),
            sensors = sensors.len(),
            alarms = config.alarms.len(),
            scheduled = schedule.len(),
            "plant built"
        );

        let mut clock = Self {
            last_readings: vec![None; sensors.len()],
            last_truth_c: None,
            control: ControlPath::default(),
            sensors,
            pid: PidController::new(config.pid),
            sequencer,
            alarms,
            commands: CommandSender::default(),
            stop: StopHandle::default(),
            schedule,
            next_scheduled: 0,
            load_profile,
            setpoint_c: config.setpoint_c,
            control_setpoint_c: config.setpoint_c,
            measured_c: room.temp_c,
            time_s: 0.0,
            tick: 0,
            stats: RunStats {
                max_temp_c: room.temp_c,
                min_temp_c: room.temp_c,
                abs_error_sum: 0.0,
                first_lag_stage_s: None,
                alarms_raised: 0,
                stopped_early: false,
            },
            last: Snapshot::default(),
            room,
            config,
        };
        clock.last = clock.capture(Vec::new());
        Ok(clock)
    }

    pub fn config(&self) -> &PlantConfig {
        &self.config
    }

    pub fn command_sender(&self) -> CommandSender {
        self.commands.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    pub fn sequencer(&self) -> &StagingSequencer {
        &self.sequencer
    }

    pub fn alarms(&self) -> &AlarmManager {
        &self.alarms
    }

    pub fn setpoint_c(&self) -> f64 {
        self.setpoint_c
    }

    pub fn time_s(&self) -> f64 {
        self.time_s
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// State at the end of the most recent tick.
    pub fn snapshot(&self) -> &Snapshot {
        &self.last
    }

    /// Advance by the configured timestep.
    pub fn tick(&mut self) -> Result<&Snapshot, SimError> {
        self.step(self.config.simulation.timestep_s)
    }

    /// Advance by `dt_s`. A zero-length step changes nothing and returns the
    /// previous snapshot.
    pub fn step(&mut self, dt_s: f64) -> Result<&Snapshot, SimError> {
        if !(dt_s.is_finite() && dt_s >= 0.0) {
            return Err(SimError::InvalidTimestep(dt_s));
        }
        if dt_s == 0.0 {
            return Ok(&self.last);
        }

        let mut events = Vec::new();

        self.apply_load_profile();
        let mut batch = self.due_commands();
        batch.extend(self.commands.drain());
        for command in batch {
            self.apply(command, &mut events);
        }

        let (measured, stuck_sensors) = self.read_sensors(dt_s, &mut events);
        let feedback = self.control.feedback(measured);
        self.control_setpoint_c = self.control.setpoint(self.setpoint_c);
        let control_sp = self.control_setpoint_c;
        let demand = self.pid.compute(control_sp, feedback, dt_s);
        let delivered = self.control.deliver(demand, self.time_s);
        events.extend(
            self.sequencer
                .update(delivered, feedback, control_sp, dt_s)
                .into_iter()
                .map(PlantEvent::Sequencer),
        );
        self.room.step(self.sequencer.total_output_kw(), dt_s);
        if let Some(fault) = self.control.advance(dt_s) {
            info!(?fault, t_s = self.time_s + dt_s, "control fault expired");
            events.push(PlantEvent::ControlFaultExpired { fault });
        }

        let inputs = self.alarm_inputs(measured, stuck_sensors);
        events.extend(
            self.alarms
                .evaluate(&inputs, dt_s)
                .into_iter()
                .map(PlantEvent::Alarm),
        );

        self.time_s += dt_s;
        self.tick += 1;
        self.record(&events);
        self.last = self.capture(events);
        Ok(&self.last)
    }

    /// Run for the configured duration, publishing every snapshot. Stops
    /// early when the stop handle is triggered.
    pub fn run<S: TelemetrySink + ?Sized>(&mut self, sink: &mut S) -> Result<RunSummary, SimError> {
        let dt_s = self.config.simulation.timestep_s;
        let ticks = (self.config.simulation.duration_s / dt_s - TIME_EPSILON_S)
            .ceil()
            .max(0.0) as u64;
        info!(ticks, dt_s, "run started");

        for _ in 0..ticks {
            if self.stop.is_stopped() {
                info!(t_s = self.time_s, "run stopped by request");
                self.stats.stopped_early = true;
                break;
            }
            self.step(dt_s)?;
            sink.publish(&self.last)?;
        }

        let summary = self.summary();
        info!(
            ticks = summary.ticks,
            max_temp_c = summary.max_temp_c,
            mean_abs_error_c = summary.mean_abs_error_c,
            alarms_raised = summary.alarms_raised,
            electrical_kwh = summary.electrical_energy_kwh,
            "run finished"
        );
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        let mean_abs_error_c = if self.tick > 0 {
            self.stats.abs_error_sum / self.tick as f64
        } else {
            0.0
        };
        RunSummary {
            ticks: self.tick,
            duration_s: self.time_s,
            stopped_early: self.stats.stopped_early,
            final_temp_c: self.room.temp_c,
            max_temp_c: self.stats.max_temp_c,
            min_temp_c: self.stats.min_temp_c,
            mean_abs_error_c,
            first_lag_stage_s: self.stats.first_lag_stage_s,
            alarms_raised: self.stats.alarms_raised,
            cooling_energy_kwh: self.room.cooling_energy_kwh(),
            electrical_energy_kwh: self.sequencer.units().map(|u| u.energy_kwh()).sum(),
            it_energy_kwh: self.room.it_energy_kwh(),
        }
    }

    fn apply_load_profile(&mut self) {
        let Some(profile) = &self.load_profile else {
            return;
        };
        if self.time_s + TIME_EPSILON_S < profile.start_s() {
            return;
        }
        self.room.it_load_kw = profile.load_at(self.time_s);
        if self.time_s + TIME_EPSILON_S >= profile.end_s() {
            debug!(t_s = self.time_s, load_kw = self.room.it_load_kw, "load profile complete");
            self.load_profile = None;
        }
    }

    fn due_commands(&mut self) -> Vec<Command> {
        let mut due = Vec::new();
        while let Some(next) = self.schedule.get(self.next_scheduled) {
            if next.at_s > self.time_s + TIME_EPSILON_S {
                break;
            }
            due.push(next.command.clone());
            self.next_scheduled += 1;
        }
        due
    }

    fn apply(&mut self, command: Command, events: &mut Vec<PlantEvent>) {
        match self.try_apply(&command) {
            Ok(alarm_event) => {
                info!(?command, t_s = self.time_s, "command applied");
                events.push(PlantEvent::CommandApplied { command });
                if let Some(ev) = alarm_event {
                    events.push(PlantEvent::Alarm(ev));
                }
            }
            Err(err) => {
                warn!(?command, %err, t_s = self.time_s, "command rejected");
                events.push(PlantEvent::CommandRejected {
                    command,
                    reason: err.to_string(),
                });
            }
        }
    }

    fn try_apply(&mut self, command: &Command) -> Result<Option<AlarmEvent>, CommandError> {
        match command {
            Command::SetSetpoint { celsius } => {
                if !celsius.is_finite() {
                    return Err(CommandError::InvalidValue {
                        what: "setpoint",
                        value: *celsius,
                    });
                }
                self.setpoint_c = *celsius;
            }
            Command::SetItLoad { kw } => {
                if !(kw.is_finite() && *kw >= 0.0) {
                    return Err(CommandError::InvalidValue {
                        what: "IT load",
                        value: *kw,
                    });
                }
                // an explicit load overrides whatever is left of the ramp
                self.load_profile = None;
                self.room.it_load_kw = *kw;
            }
            Command::FailUnit { unit } => self.sequencer.force_failure(unit)?,
            Command::InjectActuatorFault { unit, fault } => {
                self.sequencer.inject_fault(unit, *fault)?
            }
            Command::InjectControlFault { fault } => {
                let problems = fault.problems();
                if !problems.is_empty() {
                    return Err(CommandError::InvalidFault {
                        target: "control".into(),
                        problems,
                    });
                }
                self.control.inject(*fault)
            }
            Command::ClearControlFault => self.control.clear(),
            Command::ClearActuatorFault { unit } => self.sequencer.clear_fault(unit)?,
            Command::SetMaintenance { unit, enabled } => {
                self.sequencer.set_maintenance(unit, *enabled)?
            }
            Command::ReturnToService { unit } => self.sequencer.return_to_service(unit)?,
            Command::AssignRole { unit, role } => self.sequencer.assign_role(unit, *role)?,
            Command::AcknowledgeAlarm { alarm } => return Ok(Some(self.alarms.acknowledge(alarm)?)),
            Command::ResetAlarm { alarm } => return Ok(Some(self.alarms.reset(alarm)?)),
            Command::InjectSensorFault { sensor, fault } => {
                let target = self.sensor_mut(*sensor)?;
                let problems = fault.problems();
                if !problems.is_empty() {
                    return Err(CommandError::InvalidFault {
                        target: format!("sensor {sensor}"),
                        problems,
                    });
                }
                target.inject_fault(*fault)
            }
            Command::ClearSensorFault { sensor } => self.sensor_mut(*sensor)?.clear_fault(),
        }
        Ok(None)
    }

    fn sensor_mut(&mut self, index: usize) -> Result<&mut Sensor, CommandError> {
        self.sensors
            .get_mut(index)
            .ok_or(CommandError::UnknownSensor(index))
    }

    /// Mean of the valid readings, or the last good value when none is
    /// valid. Also counts sensors whose reading stayed put while the room
    /// temperature moved.
    fn read_sensors(&mut self, dt_s: f64, events: &mut Vec<PlantEvent>) -> (f64, usize) {
        let truth = self.room.temp_c;
        let truth_moved = self
            .last_truth_c
            .map_or(false, |prev| prev.to_bits() != truth.to_bits());
        self.last_truth_c = Some(truth);
        let mut sum = 0.0;
        let mut valid = 0usize;
        let mut stuck = 0usize;
        for (sensor, last) in self.sensors.iter_mut().zip(self.last_readings.iter_mut()) {
            let reading = sensor.read_temp(truth, dt_s);
            if !sensor.is_valid(reading) {
                *last = None;
                continue;
            }
            if truth_moved && last.map_or(false, |prev| prev.to_bits() == reading.to_bits()) {
                stuck += 1;
            }
            *last = Some(reading);
            sum += reading;
            valid += 1;
        }

        if valid > 0 {
            self.measured_c = sum / valid as f64;
        } else {
            debug!(t_s = self.time_s, held_c = self.measured_c, "no valid sensor reading");
            events.push(PlantEvent::MeasurementHeld {
                value_c: self.measured_c,
            });
        }
        (self.measured_c, stuck)
    }

    fn aggregate_cop(&self) -> Option<f64> {
        let power = self.sequencer.total_power_kw();
        (power > 0.0).then(|| self.sequencer.total_output_kw() / power)
    }

    fn alarm_inputs(&self, measured_c: f64, stuck_sensors: usize) -> AlarmInputs {
        let mut failed_units = 0;
        let mut units_without_output = 0;
        for unit in self.sequencer.units() {
            match unit.status() {
                UnitStatus::Failed => failed_units += 1,
                UnitStatus::Running
                    if unit.command_pct() > 0.0 && unit.output_kw() <= NO_OUTPUT_KW =>
                {
                    units_without_output += 1
                }
                _ => {}
            }
        }
        AlarmInputs {
            measured_temp_c: measured_c,
            setpoint_c: self.setpoint_c,
            failed_units,
            units_without_output,
            stuck_sensors,
            aggregate_cop: self.aggregate_cop(),
            emergency: self.sequencer.is_emergency(),
        }
    }

    fn record(&mut self, events: &[PlantEvent]) {
        let t = self.room.temp_c;
        self.stats.max_temp_c = self.stats.max_temp_c.max(t);
        self.stats.min_temp_c = self.stats.min_temp_c.min(t);
        self.stats.abs_error_sum += (t - self.setpoint_c).abs();
        for event in events {
            match event {
                PlantEvent::Sequencer(SequencerEvent::UnitStaged { .. })
                    if self.stats.first_lag_stage_s.is_none() =>
                {
                    self.stats.first_lag_stage_s = Some(self.time_s);
                }
                PlantEvent::Alarm(ev) if ev.kind == AlarmEventKind::Raised => {
                    self.stats.alarms_raised += 1;
                }
                _ => {}
            }
        }
    }

    fn capture(&self, events: Vec<PlantEvent>) -> Snapshot {
        Snapshot {
            time_s: self.time_s,
            tick: self.tick,
            room_temp_c: self.room.temp_c,
            measured_temp_c: self.measured_c,
            setpoint_c: self.setpoint_c,
            control_setpoint_c: self.control_setpoint_c,
            control_fault: self.control.fault(),
            error_c: self.setpoint_c - self.measured_c,
            pid: self.pid.last_terms(),
            it_load_kw: self.room.it_load_kw,
            units: self.sequencer.views(),
            alarms: self.alarms.snapshot(),
            total_cooling_kw: self.sequencer.total_output_kw(),
            total_power_kw: self.sequencer.total_power_kw(),
            cop: self.aggregate_cop(),
            emergency: self.sequencer.is_emergency(),
            events,
        }
    }
}
