//! Alarm supervision with debounce, latching, acknowledgement and escalation.
//!
//! Every configured alarm owns one lifecycle:
//! `Idle -> Debounce -> Active -> {Acknowledged | Cleared}`,
//! `Acknowledged -> Cleared -> Idle`. Conditions are judged against the
//! per-tick [`AlarmInputs`]; all delays are accumulated simulated time.

use controller::{EdgeTimer, TIME_EPSILON_S};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub type Result<T> = std::result::Result<T, AlarmError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl AlarmPriority {
    /// One level more urgent, capped at Critical.
    pub fn escalate(self) -> Self {
        match self {
            AlarmPriority::Low => AlarmPriority::Medium,
            AlarmPriority::Medium => AlarmPriority::High,
            AlarmPriority::High | AlarmPriority::Critical => AlarmPriority::Critical,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    Idle,
    Debounce,
    Active,
    Acknowledged,
    Cleared,
}

impl AlarmState {
    /// Raised and not yet cleared.
    pub fn is_alarmed(self) -> bool {
        matches!(self, AlarmState::Active | AlarmState::Acknowledged)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlarmCondition {
    HighTemperature { above_setpoint_c: f64 },
    LowTemperature { below_setpoint_c: f64 },
    /// A unit is failed, or running and commanded without delivering output.
    UnitFailure,
    SensorStuck,
    ControlAccuracy { max_error_c: f64 },
    LowEfficiency { min_cop: f64 },
    Emergency,
}

impl AlarmCondition {
    pub fn holds(&self, inputs: &AlarmInputs) -> bool {
        let error = inputs.measured_temp_c - inputs.setpoint_c;
        match *self {
            AlarmCondition::HighTemperature { above_setpoint_c } => error > above_setpoint_c,
            AlarmCondition::LowTemperature { below_setpoint_c } => -error > below_setpoint_c,
            AlarmCondition::UnitFailure => {
                inputs.failed_units > 0 || inputs.units_without_output > 0
            }
            AlarmCondition::SensorStuck => inputs.stuck_sensors > 0,
            AlarmCondition::ControlAccuracy { max_error_c } => error.abs() > max_error_c,
            AlarmCondition::LowEfficiency { min_cop } => {
                inputs.aggregate_cop.map_or(false, |cop| cop < min_cop)
            }
            AlarmCondition::Emergency => inputs.emergency,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlarmDefinition {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub priority: AlarmPriority,
    pub condition: AlarmCondition,
    pub debounce_on_s: f64,
    #[serde(default)]
    pub debounce_off_s: f64,
    /// Latched alarms ignore their condition once raised and need
    /// acknowledge followed by reset.
    #[serde(default = "default_true")]
    pub latched: bool,
    #[serde(default)]
    pub auto_clear: bool,
    #[serde(default)]
    pub escalation_s: Option<f64>,
}

impl AlarmDefinition {
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.id.trim().is_empty() {
            out.push("alarm id must not be empty".to_string());
        }
        for (name, v) in [
            ("debounce_on_s", self.debounce_on_s),
            ("debounce_off_s", self.debounce_off_s),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                out.push(format!("alarm {}: {name} must be >= 0 (got {v})", self.id));
            }
        }
        if let Some(e) = self.escalation_s {
            if !(e.is_finite() && e > 0.0) {
                out.push(format!("alarm {}: escalation_s must be > 0 (got {e})", self.id));
            }
        }
        if self.latched && self.auto_clear {
            out.push(format!("alarm {}: a latched alarm cannot auto_clear", self.id));
        }
        let threshold = match self.condition {
            AlarmCondition::HighTemperature { above_setpoint_c: v }
            | AlarmCondition::LowTemperature { below_setpoint_c: v }
            | AlarmCondition::ControlAccuracy { max_error_c: v }
            | AlarmCondition::LowEfficiency { min_cop: v } => Some(v),
            _ => None,
        };
        if let Some(v) = threshold {
            if !(v.is_finite() && v >= 0.0) {
                out.push(format!("alarm {}: threshold must be >= 0 (got {v})", self.id));
            }
        }
        out
    }
}

/// Plant values the conditions are judged against, assembled once per tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlarmInputs {
    pub measured_temp_c: f64,
    pub setpoint_c: f64,
    pub failed_units: usize,
    pub units_without_output: usize,
    pub stuck_sensors: usize,
    /// None while nothing is cooling.
    pub aggregate_cop: Option<f64>,
    pub emergency: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmEventKind {
    Raised,
    Escalated,
    Acknowledged,
    Cleared,
    Reset,
    Idle,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub at_s: f64,
    pub alarm_id: String,
    pub kind: AlarmEventKind,
    pub priority: AlarmPriority,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AlarmError {
    #[error("unknown alarm {0}")]
    UnknownAlarm(String),
    #[error("duplicate alarm id {0}")]
    DuplicateId(String),
    #[error("cannot {action} alarm {alarm} while {state:?}")]
    InvalidTransition {
        alarm: String,
        action: &'static str,
        state: AlarmState,
    },
}

/// Published view of one alarm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlarmSnapshot {
    pub id: String,
    pub state: AlarmState,
    pub priority: AlarmPriority,
    pub escalated: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmSummary {
    pub total: usize,
    pub alarmed: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub occurrences: u32,
}

#[derive(Clone, Debug)]
pub struct Alarm {
    def: AlarmDefinition,
    state: AlarmState,
    priority: AlarmPriority,
    on_delay: EdgeTimer,
    off_delay: EdgeTimer,
    raised_at_s: Option<f64>,
    next_escalation_s: Option<f64>,
    occurrences: u32,
}

impl Alarm {
    fn new(def: AlarmDefinition) -> Self {
        Self {
            priority: def.priority,
            def,
            state: AlarmState::Idle,
            on_delay: EdgeTimer::new(),
            off_delay: EdgeTimer::new(),
            raised_at_s: None,
            next_escalation_s: None,
            occurrences: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn definition(&self) -> &AlarmDefinition {
        &self.def
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Current priority, which may be above the configured one after escalation.
    pub fn priority(&self) -> AlarmPriority {
        self.priority
    }

    pub fn escalated(&self) -> bool {
        self.priority != self.def.priority
    }

    pub fn raised_at_s(&self) -> Option<f64> {
        self.raised_at_s
    }

    pub fn occurrences(&self) -> u32 {
        self.occurrences
    }

    fn snapshot(&self) -> AlarmSnapshot {
        AlarmSnapshot {
            id: self.def.id.clone(),
            state: self.state,
            priority: self.priority,
            escalated: self.escalated(),
        }
    }

    fn event(&self, at_s: f64, kind: AlarmEventKind) -> AlarmEvent {
        AlarmEvent {
            at_s,
            alarm_id: self.def.id.clone(),
            kind,
            priority: self.priority,
        }
    }

    fn raise(&mut self, now_s: f64) -> AlarmEvent {
        self.state = AlarmState::Active;
        self.on_delay.reset();
        self.off_delay.reset();
        self.raised_at_s = Some(now_s);
        self.next_escalation_s = self.def.escalation_s.map(|e| now_s + e);
        self.occurrences += 1;
        match self.priority {
            AlarmPriority::Critical | AlarmPriority::High => {
                warn!(alarm = %self.def.id, priority = ?self.priority, t_s = now_s, "alarm raised")
            }
            _ => info!(alarm = %self.def.id, priority = ?self.priority, t_s = now_s, "alarm raised"),
        }
        self.event(now_s, AlarmEventKind::Raised)
    }

    fn return_to_idle(&mut self) {
        self.state = AlarmState::Idle;
        self.priority = self.def.priority;
        self.on_delay.reset();
        self.off_delay.reset();
        self.raised_at_s = None;
        self.next_escalation_s = None;
    }

    fn step(&mut self, condition: bool, now_s: f64, dt_s: f64, out: &mut Vec<AlarmEvent>) {
        match self.state {
            AlarmState::Idle | AlarmState::Debounce => {
                if !condition {
                    if self.state == AlarmState::Debounce {
                        debug!(alarm = %self.def.id, "condition cleared during debounce");
                    }
                    self.return_to_idle();
                    return;
                }
                self.on_delay.update(true, dt_s);
                self.state = AlarmState::Debounce;
                if self.on_delay.held_for(self.def.debounce_on_s) {
                    out.push(self.raise(now_s));
                }
            }
            AlarmState::Active | AlarmState::Acknowledged => {
                if self.state == AlarmState::Active {
                    self.check_escalation(now_s, out);
                }
                if self.def.latched || !self.def.auto_clear {
                    return;
                }
                self.off_delay.update(!condition, dt_s);
                if self.off_delay.held_for(self.def.debounce_off_s) {
                    self.state = AlarmState::Cleared;
                    self.off_delay.reset();
                    info!(alarm = %self.def.id, t_s = now_s, "alarm cleared");
                    out.push(self.event(now_s, AlarmEventKind::Cleared));
                }
            }
            AlarmState::Cleared => {
                self.return_to_idle();
                out.push(self.event(now_s, AlarmEventKind::Idle));
            }
        }
    }

    fn check_escalation(&mut self, now_s: f64, out: &mut Vec<AlarmEvent>) {
        let (Some(deadline), Some(every)) = (self.next_escalation_s, self.def.escalation_s) else {
            return;
        };
        if now_s + TIME_EPSILON_S < deadline {
            return;
        }
        self.next_escalation_s = Some(deadline + every);
        let next = self.priority.escalate();
        if next != self.priority {
            self.priority = next;
            warn!(alarm = %self.def.id, priority = ?next, t_s = now_s, "unacknowledged alarm escalated");
            out.push(self.event(now_s, AlarmEventKind::Escalated));
        }
    }
}

/// Owns every configured alarm and its history.
#[derive(Clone, Debug)]
pub struct AlarmManager {
    alarms: Vec<Alarm>,
    now_s: f64,
    history: Vec<AlarmEvent>,
}

impl AlarmManager {
    pub fn new(definitions: Vec<AlarmDefinition>) -> Result<Self> {
        let mut alarms: Vec<Alarm> = Vec::with_capacity(definitions.len());
        for def in definitions {
            if alarms.iter().any(|a| a.def.id == def.id) {
                return Err(AlarmError::DuplicateId(def.id));
            }
            alarms.push(Alarm::new(def));
        }
        Ok(Self {
            alarms,
            now_s: 0.0,
            history: Vec::new(),
        })
    }

    pub fn now_s(&self) -> f64 {
        self.now_s
    }

    pub fn alarms(&self) -> &[Alarm] {
        &self.alarms
    }

    pub fn get(&self, id: &str) -> Option<&Alarm> {
        self.alarms.iter().find(|a| a.def.id == id)
    }

    pub fn state_of(&self, id: &str) -> Option<AlarmState> {
        self.get(id).map(Alarm::state)
    }

    pub fn history(&self) -> &[AlarmEvent] {
        &self.history
    }

    /// Alarms currently raised (Active or Acknowledged).
    pub fn active(&self) -> impl Iterator<Item = &Alarm> {
        self.alarms.iter().filter(|a| a.state.is_alarmed())
    }

    pub fn snapshot(&self) -> Vec<AlarmSnapshot> {
        self.alarms.iter().map(Alarm::snapshot).collect()
    }

    pub fn summary(&self) -> AlarmSummary {
        let mut s = AlarmSummary {
            total: self.alarms.len(),
            ..AlarmSummary::default()
        };
        for a in &self.alarms {
            s.occurrences += a.occurrences;
            if !a.state.is_alarmed() {
                continue;
            }
            s.alarmed += 1;
            match a.priority {
                AlarmPriority::Critical => s.critical += 1,
                AlarmPriority::High => s.high += 1,
                AlarmPriority::Medium => s.medium += 1,
                AlarmPriority::Low => s.low += 1,
            }
        }
        s
    }

    /// Advance the alarm clock by `dt_s` and run every lifecycle once.
    /// Returned events are stamped with the time at the end of the step.
    pub fn evaluate(&mut self, inputs: &AlarmInputs, dt_s: f64) -> Vec<AlarmEvent> {
        self.now_s += dt_s;
        let mut events = Vec::new();
        for alarm in &mut self.alarms {
            let condition = alarm.def.condition.holds(inputs);
            alarm.step(condition, self.now_s, dt_s, &mut events);
        }
        self.history.extend(events.iter().cloned());
        events
    }

    pub fn acknowledge(&mut self, id: &str) -> Result<AlarmEvent> {
        let now_s = self.now_s;
        let alarm = self.find_mut(id)?;
        if alarm.state != AlarmState::Active {
            return Err(AlarmError::InvalidTransition {
                alarm: id.to_string(),
                action: "acknowledge",
                state: alarm.state,
            });
        }
        alarm.state = AlarmState::Acknowledged;
        alarm.next_escalation_s = None;
        info!(alarm = id, t_s = now_s, "alarm acknowledged");
        let event = alarm.event(now_s, AlarmEventKind::Acknowledged);
        self.history.push(event.clone());
        Ok(event)
    }

    /// Operator reset of an acknowledged alarm. It passes through Cleared and
    /// returns to Idle at the next evaluation, so a condition that still holds
    /// starts a fresh debounce from there.
    pub fn reset(&mut self, id: &str) -> Result<AlarmEvent> {
        let now_s = self.now_s;
        let alarm = self.find_mut(id)?;
        if alarm.state != AlarmState::Acknowledged {
            return Err(AlarmError::InvalidTransition {
                alarm: id.to_string(),
                action: "reset",
                state: alarm.state,
            });
        }
        alarm.state = AlarmState::Cleared;
        info!(alarm = id, t_s = now_s, "alarm reset");
        let event = alarm.event(now_s, AlarmEventKind::Reset);
        self.history.push(event.clone());
        Ok(event)
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut Alarm> {
        self.alarms
            .iter_mut()
            .find(|a| a.def.id == id)
            .ok_or_else(|| AlarmError::UnknownAlarm(id.to_string()))
    }
}
