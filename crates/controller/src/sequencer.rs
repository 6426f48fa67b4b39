//! Lead/lag/standby sequencing of redundant CRAC units.
//!
//! Roles are not stored on the units. They follow from a unit's position in
//! the in-service roster: the front unit leads, the next one is lag and the
//! rest stand by. Failed or maintenance units are simply not in the roster,
//! so they cannot hold a role, and removing a unit shifts everyone behind it
//! up one place in a single operation.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use sim::{ActuatorFault, CracUnit, UnitStatus};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::timer::{EdgeTimer, TIME_EPSILON_S};

/// Delivered cooling at or below this counts as "no output".
const NO_OUTPUT_KW: f64 = 1e-9;

pub type Result<T> = std::result::Result<T, SequencerError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Lead,
    Lag,
    Standby,
}

impl Role {
    fn at(position: usize) -> Role {
        match position {
            0 => Role::Lead,
            1 => Role::Lag,
            _ => Role::Standby,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Floor applied to the lead command.
    pub min_lead_pct: f64,
    /// Stage the lag when room temperature exceeds setpoint by more than this...
    pub stage_error_c: f64,
    /// ...continuously for this long.
    pub stage_error_dwell_s: f64,
    /// Or when the lead command exceeds this...
    pub stage_capacity_pct: f64,
    /// ...continuously for this long.
    pub stage_capacity_dwell_s: f64,
    pub destage_error_c: f64,
    pub destage_capacity_pct: f64,
    pub destage_dwell_s: f64,
    pub min_on_s: f64,
    pub min_off_s: f64,
    /// A running unit commanded above zero that delivers nothing for this
    /// long is declared failed.
    pub fail_timeout_s: f64,
    #[serde(default)]
    pub rotation_interval_s: Option<f64>,
    #[serde(default)]
    pub rotation_deadband_c: f64,
}

impl StagingConfig {
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        let non_negative = [
            ("stage_error_dwell_s", self.stage_error_dwell_s),
            ("stage_capacity_dwell_s", self.stage_capacity_dwell_s),
            ("destage_dwell_s", self.destage_dwell_s),
            ("min_on_s", self.min_on_s),
            ("min_off_s", self.min_off_s),
            ("rotation_deadband_c", self.rotation_deadband_c),
        ];
        for (name, v) in non_negative {
            if !(v.is_finite() && v >= 0.0) {
                out.push(format!("staging.{name} must be finite and >= 0 (got {v})"));
            }
        }
        let percentages = [
            ("min_lead_pct", self.min_lead_pct),
            ("stage_capacity_pct", self.stage_capacity_pct),
            ("destage_capacity_pct", self.destage_capacity_pct),
        ];
        for (name, v) in percentages {
            if !(0.0..=100.0).contains(&v) {
                out.push(format!("staging.{name} must lie within 0..=100 (got {v})"));
            }
        }
        if !(self.stage_error_c.is_finite() && self.destage_error_c.is_finite()) {
            out.push("staging error thresholds must be finite".to_string());
        } else if self.destage_error_c >= self.stage_error_c {
            out.push(format!(
                "staging.destage_error_c ({}) must be below stage_error_c ({})",
                self.destage_error_c, self.stage_error_c
            ));
        }
        if self.destage_capacity_pct >= self.stage_capacity_pct {
            out.push(format!(
                "staging.destage_capacity_pct ({}) must be below stage_capacity_pct ({})",
                self.destage_capacity_pct, self.stage_capacity_pct
            ));
        }
        if !(self.fail_timeout_s.is_finite() && self.fail_timeout_s > 0.0) {
            out.push(format!(
                "staging.fail_timeout_s must be > 0 (got {})",
                self.fail_timeout_s
            ));
        }
        if let Some(r) = self.rotation_interval_s {
            if !(r.is_finite() && r > 0.0) {
                out.push(format!("staging.rotation_interval_s must be > 0 (got {r})"));
            }
        }
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCondition {
    ErrorAboveThreshold,
    LeadOutputAboveThreshold,
    LoadBelowThreshold,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    NoOutput,
    Forced,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SequencerEvent {
    UnitStarted { unit: String, role: Role },
    UnitStaged { unit: String, trigger: StageCondition },
    UnitDestaged { unit: String },
    UnitStopped { unit: String },
    UnitFailed { unit: String, cause: FailureCause },
    RoleChanged { unit: String, from: Option<Role>, to: Role },
    MaintenanceEntered { unit: String },
    ReturnedToService { unit: String },
    HandoffStarted { incoming: String },
    HandoffCancelled { incoming: String },
    RolesRotated { lead: String },
    EmergencyEntered,
    EmergencyCleared { lead: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SequencerError {
    #[error("no cooling units configured")]
    NoUnits,
    #[error("duplicate unit id {0}")]
    DuplicateUnit(String),
    #[error("unknown unit {0}")]
    UnknownUnit(String),
    #[error("unit {unit} is {status:?} and holds no role")]
    NotInService { unit: String, status: UnitStatus },
    #[error("unit {0} is already in service")]
    AlreadyInService(String),
    #[error("invalid actuator fault for unit {unit}: {reason}")]
    InvalidFault { unit: String, reason: String },
    #[error("unit {unit} cannot take role {role:?} with {in_service} unit(s) in service")]
    RoleUnavailable {
        unit: String,
        role: Role,
        in_service: usize,
    },
}

/// Published view of one unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitView {
    pub id: String,
    pub role: Option<Role>,
    pub status: UnitStatus,
    pub command_pct: f64,
    pub output_kw: f64,
    pub power_kw: f64,
    pub rated_kw: f64,
}

#[derive(Clone, Debug)]
struct UnitSlot {
    unit: CracUnit,
    no_output: EdgeTimer,
    started_at_s: Option<f64>,
    stopped_at_s: Option<f64>,
}

#[derive(Clone, Debug, Default)]
struct StagingTimers {
    stage_error: EdgeTimer,
    stage_capacity: EdgeTimer,
    destage: EdgeTimer,
}

impl StagingTimers {
    fn get(&self, cond: StageCondition) -> &EdgeTimer {
        match cond {
            StageCondition::ErrorAboveThreshold => &self.stage_error,
            StageCondition::LeadOutputAboveThreshold => &self.stage_capacity,
            StageCondition::LoadBelowThreshold => &self.destage,
        }
    }

    fn reset_stage(&mut self) {
        self.stage_error.reset();
        self.stage_capacity.reset();
    }

    fn reset_all(&mut self) {
        self.reset_stage();
        self.destage.reset();
    }

    fn any_armed(&self) -> bool {
        self.stage_error.is_armed() || self.stage_capacity.is_armed() || self.destage.is_armed()
    }
}

#[derive(Clone, Debug)]
pub struct StagingSequencer {
    cfg: StagingConfig,
    slots: Vec<UnitSlot>,
    roster: VecDeque<usize>,
    timers: StagingTimers,
    now_s: f64,
    since_rotation_s: f64,
    handoff: Option<usize>,
    emergency: bool,
    full_drive: bool,
    events: Vec<SequencerEvent>,
}

impl StagingSequencer {
    /// Units enter the roster in the order given: first lead, second lag.
    pub fn new(units: Vec<CracUnit>, cfg: StagingConfig) -> Result<Self> {
        if units.is_empty() {
            return Err(SequencerError::NoUnits);
        }
        for (i, u) in units.iter().enumerate() {
            if units[..i].iter().any(|o| o.id() == u.id()) {
                return Err(SequencerError::DuplicateUnit(u.id().to_string()));
            }
        }
        let roster: VecDeque<usize> = units
            .iter()
            .enumerate()
            .filter(|(_, u)| u.is_in_service())
            .map(|(i, _)| i)
            .collect();
        let emergency = roster.is_empty();
        let slots = units
            .into_iter()
            .map(|unit| UnitSlot {
                unit,
                no_output: EdgeTimer::new(),
                started_at_s: None,
                stopped_at_s: None,
            })
            .collect();
        Ok(Self {
            cfg,
            slots,
            roster,
            timers: StagingTimers::default(),
            now_s: 0.0,
            since_rotation_s: 0.0,
            handoff: None,
            emergency,
            full_drive: false,
            events: Vec::new(),
        })
    }

    pub fn config(&self) -> &StagingConfig {
        &self.cfg
    }

    pub fn now_s(&self) -> f64 {
        self.now_s
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    pub fn handoff_pending(&self) -> bool {
        self.handoff.is_some()
    }

    pub fn units(&self) -> impl Iterator<Item = &CracUnit> {
        self.slots.iter().map(|s| &s.unit)
    }

    pub fn unit(&self, id: &str) -> Option<&CracUnit> {
        self.slots.iter().map(|s| &s.unit).find(|u| u.id() == id)
    }

    pub fn role_of(&self, id: &str) -> Option<Role> {
        self.index_of(id).ok().and_then(|idx| self.role_of_index(idx))
    }

    pub fn lead(&self) -> Option<&CracUnit> {
        self.roster.front().map(|&i| &self.slots[i].unit)
    }

    pub fn lag(&self) -> Option<&CracUnit> {
        self.roster.get(1).map(|&i| &self.slots[i].unit)
    }

    /// How long a staging condition has held, zero when not armed.
    pub fn stage_timer_s(&self, cond: StageCondition) -> f64 {
        self.timers.get(cond).elapsed_s()
    }

    pub fn total_output_kw(&self) -> f64 {
        self.slots.iter().map(|s| s.unit.output_kw()).sum()
    }

    pub fn total_power_kw(&self) -> f64 {
        self.slots.iter().map(|s| s.unit.power_kw()).sum()
    }

    /// Rated capacity of every unit still in service.
    pub fn in_service_capacity_kw(&self) -> f64 {
        self.roster.iter().map(|&i| self.slots[i].unit.params().rated_kw).sum()
    }

    pub fn views(&self) -> Vec<UnitView> {
        self.slots
            .iter()
            .enumerate()
            .map(|(idx, s)| UnitView {
                id: s.unit.id().to_string(),
                role: self.role_of_index(idx),
                status: s.unit.status(),
                command_pct: s.unit.command_pct(),
                output_kw: s.unit.output_kw(),
                power_kw: s.unit.power_kw(),
                rated_kw: s.unit.params().rated_kw,
            })
            .collect()
    }

    /// One control step. Runs failure detection, staging, rotation and
    /// command distribution in that order, then advances the units. Events
    /// from operator actions since the previous step are returned as well.
    pub fn update(
        &mut self,
        demand_pct: f64,
        measured_c: f64,
        setpoint_c: f64,
        dt_s: f64,
    ) -> Vec<SequencerEvent> {
        let demand = if demand_pct.is_nan() {
            0.0
        } else {
            demand_pct.clamp(0.0, 100.0)
        };
        let lead_pct = demand.max(self.cfg.min_lead_pct).min(100.0);
        let excess_c = measured_c - setpoint_c;

        self.detect_failures(dt_s);
        self.evaluate_staging(excess_c, lead_pct, dt_s);
        self.evaluate_rotation(excess_c, dt_s);
        self.distribute(demand, lead_pct);

        for slot in &mut self.slots {
            slot.unit.step(dt_s);
        }
        self.now_s += dt_s;

        debug_assert_eq!(self.emergency, self.roster.is_empty());
        std::mem::take(&mut self.events)
    }

    pub fn force_failure(&mut self, id: &str) -> Result<()> {
        let idx = self.index_of(id)?;
        if self.slots[idx].unit.status() == UnitStatus::Failed {
            return Ok(());
        }
        self.fail_unit(idx, FailureCause::Forced);
        Ok(())
    }

    pub fn set_maintenance(&mut self, id: &str, enabled: bool) -> Result<()> {
        let idx = self.index_of(id)?;
        if !enabled {
            return self.return_to_service(id);
        }
        if self.slots[idx].unit.status() == UnitStatus::Maintenance {
            return Ok(());
        }
        self.take_out_of_service(idx);
        self.slots[idx].unit.enter_maintenance();
        self.slots[idx].stopped_at_s = Some(self.now_s);
        info!(unit = id, "unit placed in maintenance");
        self.events.push(SequencerEvent::MaintenanceEntered {
            unit: id.to_string(),
        });
        Ok(())
    }

    /// Bring a failed or maintenance unit back. It joins the roster at the
    /// back; if the plant was in emergency it becomes lead and is driven at
    /// full output for its first step.
    pub fn return_to_service(&mut self, id: &str) -> Result<()> {
        let idx = self.index_of(id)?;
        if !self.slots[idx].unit.return_to_service() {
            return Err(SequencerError::AlreadyInService(id.to_string()));
        }
        self.slots[idx].no_output.reset();
        let before = self.roles();
        self.roster.push_back(idx);
        self.events.push(SequencerEvent::ReturnedToService {
            unit: id.to_string(),
        });
        self.emit_role_changes(&before);
        if self.emergency {
            self.emergency = false;
            self.full_drive = true;
            info!(unit = id, "emergency cleared; unit takes the lead");
            self.events.push(SequencerEvent::EmergencyCleared {
                lead: id.to_string(),
            });
        } else {
            info!(unit = id, role = ?self.role_of_index(idx), "unit returned to service");
        }
        Ok(())
    }

    /// Operator role override. The unit is moved to the roster position of
    /// `role` in one step; the displaced units keep their relative order.
    pub fn assign_role(&mut self, id: &str, role: Role) -> Result<()> {
        let idx = self.index_of(id)?;
        let Some(pos) = self.roster.iter().position(|&i| i == idx) else {
            return Err(SequencerError::NotInService {
                unit: id.to_string(),
                status: self.slots[idx].unit.status(),
            });
        };
        let len = self.roster.len();
        let target = match role {
            Role::Lead => 0,
            Role::Lag => 1,
            Role::Standby => len - 1,
        };
        if target >= len || Role::at(target) != role {
            return Err(SequencerError::RoleUnavailable {
                unit: id.to_string(),
                role,
                in_service: len,
            });
        }
        if target == pos {
            return Ok(());
        }
        let before = self.roles();
        self.roster.remove(pos);
        self.roster.insert(target, idx);
        self.cancel_handoff();
        self.timers.reset_all();
        info!(unit = id, ?role, "role assigned by operator");
        self.emit_role_changes(&before);
        Ok(())
    }

    pub fn inject_fault(&mut self, id: &str, fault: ActuatorFault) -> Result<()> {
        let idx = self.index_of(id)?;
        if let Some(reason) = fault.problems().into_iter().next() {
            return Err(SequencerError::InvalidFault {
                unit: id.to_string(),
                reason,
            });
        }
        debug!(unit = id, ?fault, "actuator fault injected");
        self.slots[idx].unit.inject_fault(fault);
        Ok(())
    }

    pub fn clear_fault(&mut self, id: &str) -> Result<()> {
        let idx = self.index_of(id)?;
        self.slots[idx].unit.clear_fault();
        Ok(())
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.slots
            .iter()
            .position(|s| s.unit.id() == id)
            .ok_or_else(|| SequencerError::UnknownUnit(id.to_string()))
    }

    fn role_of_index(&self, idx: usize) -> Option<Role> {
        self.roster.iter().position(|&i| i == idx).map(Role::at)
    }

    fn roles(&self) -> Vec<Option<Role>> {
        (0..self.slots.len()).map(|i| self.role_of_index(i)).collect()
    }

    fn emit_role_changes(&mut self, before: &[Option<Role>]) {
        for idx in 0..self.slots.len() {
            let now = self.role_of_index(idx);
            if let Some(to) = now {
                if before[idx] != now {
                    self.events.push(SequencerEvent::RoleChanged {
                        unit: self.slots[idx].unit.id().to_string(),
                        from: before[idx],
                        to,
                    });
                }
            }
        }
    }

    fn id(&self, idx: usize) -> String {
        self.slots[idx].unit.id().to_string()
    }

    fn start_unit(&mut self, idx: usize) -> bool {
        let slot = &mut self.slots[idx];
        if slot.unit.start() {
            slot.started_at_s = Some(self.now_s);
            true
        } else {
            false
        }
    }

    fn stop_unit(&mut self, idx: usize) -> bool {
        let slot = &mut self.slots[idx];
        if slot.unit.stop() {
            slot.stopped_at_s = Some(self.now_s);
            true
        } else {
            false
        }
    }

    fn min_off_elapsed(&self, idx: usize) -> bool {
        self.slots[idx]
            .stopped_at_s
            .map_or(true, |t| self.now_s - t + TIME_EPSILON_S >= self.cfg.min_off_s)
    }

    fn min_on_elapsed(&self, idx: usize) -> bool {
        self.slots[idx]
            .started_at_s
            .map_or(true, |t| self.now_s - t + TIME_EPSILON_S >= self.cfg.min_on_s)
    }

    fn cancel_handoff(&mut self) {
        if let Some(incoming) = self.handoff.take() {
            debug!(unit = %self.id(incoming), "rotation handoff cancelled");
            self.events.push(SequencerEvent::HandoffCancelled {
                incoming: self.id(incoming),
            });
        }
    }

    /// Remove a unit from the roster and promote the units behind it. Every
    /// unit that was cooling among the front two positions is replaced by a
    /// running unit straight away; failure response skips dwell and min-off.
    fn take_out_of_service(&mut self, idx: usize) {
        let Some(pos) = self.roster.iter().position(|&i| i == idx) else {
            return;
        };
        let before = self.roles();
        let cooling_front = self
            .roster
            .iter()
            .take(2)
            .filter(|&&i| self.slots[i].unit.is_active())
            .count();

        self.roster.remove(pos);
        if self.handoff == Some(idx) {
            self.handoff = None;
        } else if pos <= 1 {
            self.cancel_handoff();
        }
        self.timers.reset_all();
        self.emit_role_changes(&before);

        let front: Vec<usize> = self.roster.iter().take(cooling_front).copied().collect();
        for next in front {
            if self.start_unit(next) {
                let role = self.role_of_index(next).unwrap_or(Role::Standby);
                info!(unit = %self.id(next), ?role, "replacement unit started");
                self.events.push(SequencerEvent::UnitStarted {
                    unit: self.id(next),
                    role,
                });
            }
        }

        if self.roster.is_empty() && !self.emergency {
            self.emergency = true;
            warn!("no cooling unit left in service; entering emergency");
            self.events.push(SequencerEvent::EmergencyEntered);
        }
    }

    fn fail_unit(&mut self, idx: usize, cause: FailureCause) {
        let id = self.id(idx);
        warn!(unit = %id, ?cause, role = ?self.role_of_index(idx), "unit failed");
        self.events.push(SequencerEvent::UnitFailed {
            unit: id,
            cause,
        });
        self.take_out_of_service(idx);
        let slot = &mut self.slots[idx];
        slot.unit.fail();
        slot.no_output.reset();
        slot.stopped_at_s = Some(self.now_s);
    }

    fn detect_failures(&mut self, dt_s: f64) {
        let timeout = self.cfg.fail_timeout_s;
        let mut failed = Vec::new();
        for &idx in &self.roster {
            let slot = &mut self.slots[idx];
            let starved = slot.unit.status() == UnitStatus::Running
                && slot.unit.command_pct() > 0.0
                && slot.unit.output_kw() <= NO_OUTPUT_KW;
            slot.no_output.update(starved, dt_s);
            if slot.no_output.held_for(timeout) {
                failed.push(idx);
            }
        }
        for idx in failed {
            self.fail_unit(idx, FailureCause::NoOutput);
        }
    }

    fn evaluate_staging(&mut self, excess_c: f64, lead_pct: f64, dt_s: f64) {
        let Some(&lag) = self.roster.get(1) else {
            self.timers.reset_all();
            return;
        };

        match self.slots[lag].unit.status() {
            UnitStatus::Off => {
                self.timers.destage.reset();
                self.timers
                    .stage_error
                    .update(excess_c > self.cfg.stage_error_c, dt_s);
                self.timers
                    .stage_capacity
                    .update(lead_pct > self.cfg.stage_capacity_pct, dt_s);

                let trigger = if self.timers.stage_error.held_for(self.cfg.stage_error_dwell_s) {
                    Some(StageCondition::ErrorAboveThreshold)
                } else if self
                    .timers
                    .stage_capacity
                    .held_for(self.cfg.stage_capacity_dwell_s)
                {
                    Some(StageCondition::LeadOutputAboveThreshold)
                } else {
                    None
                };
                let Some(trigger) = trigger else {
                    return;
                };
                if !self.min_off_elapsed(lag) {
                    debug!(unit = %self.id(lag), "stage request held by min-off time");
                    return;
                }
                self.start_unit(lag);
                self.timers.reset_stage();
                info!(unit = %self.id(lag), ?trigger, t_s = self.now_s, "lag staged");
                self.events.push(SequencerEvent::UnitStaged {
                    unit: self.id(lag),
                    trigger,
                });
            }
            UnitStatus::Running => {
                self.timers.reset_stage();
                let light = excess_c < self.cfg.destage_error_c
                    && lead_pct < self.cfg.destage_capacity_pct;
                self.timers.destage.update(light, dt_s);
                if self.handoff.is_none()
                    && self.timers.destage.held_for(self.cfg.destage_dwell_s)
                    && self.min_on_elapsed(lag)
                {
                    self.stop_unit(lag);
                    self.timers.destage.reset();
                    info!(unit = %self.id(lag), t_s = self.now_s, "lag destaged");
                    self.events.push(SequencerEvent::UnitDestaged { unit: self.id(lag) });
                }
            }
            _ => self.timers.reset_all(),
        }
    }

    /// Periodic duty rotation through a handoff: the lag is started first and
    /// the roster only rotates once it reports running, so the lead role moves
    /// between two running units in one step.
    fn evaluate_rotation(&mut self, excess_c: f64, dt_s: f64) {
        let Some(interval) = self.cfg.rotation_interval_s else {
            return;
        };

        if let Some(incoming) = self.handoff {
            if self.roster.get(1) != Some(&incoming) || excess_c > self.cfg.stage_error_c {
                self.cancel_handoff();
                return;
            }
            if self.slots[incoming].unit.status() != UnitStatus::Running {
                return;
            }
            let before = self.roles();
            if let Some(outgoing) = self.roster.pop_front() {
                self.roster.push_back(outgoing);
                self.stop_unit(outgoing);
            }
            self.handoff = None;
            self.since_rotation_s = 0.0;
            self.timers.reset_all();
            info!(lead = %self.id(incoming), t_s = self.now_s, "duty roles rotated");
            self.emit_role_changes(&before);
            self.events.push(SequencerEvent::RolesRotated {
                lead: self.id(incoming),
            });
            return;
        }

        self.since_rotation_s += dt_s;
        if self.since_rotation_s + TIME_EPSILON_S < interval || self.roster.len() < 2 {
            return;
        }
        let (lead, lag) = (self.roster[0], self.roster[1]);
        let steady = !self.emergency
            && excess_c.abs() <= self.cfg.rotation_deadband_c
            && !self.timers.any_armed()
            && self.slots[lead].unit.status() == UnitStatus::Running
            && self.slots[lag].unit.status() == UnitStatus::Off
            && self.min_off_elapsed(lag);
        if steady && self.start_unit(lag) {
            self.handoff = Some(lag);
            info!(incoming = %self.id(lag), "rotation handoff started");
            self.events.push(SequencerEvent::HandoffStarted {
                incoming: self.id(lag),
            });
        }
    }

    /// The lead gets the floored command once it runs; while it is still
    /// starting it follows the raw demand. An active lag mirrors the lead.
    fn distribute(&mut self, demand_pct: f64, lead_pct: f64) {
        let full_drive = std::mem::take(&mut self.full_drive);
        let mut lead_cmd = 0.0;
        let roster: Vec<usize> = self.roster.iter().copied().collect();
        for (pos, idx) in roster.into_iter().enumerate() {
            match Role::at(pos) {
                Role::Lead => {
                    if !self.slots[idx].unit.is_active() && self.start_unit(idx) {
                        info!(unit = %self.id(idx), "lead started");
                        self.events.push(SequencerEvent::UnitStarted {
                            unit: self.id(idx),
                            role: Role::Lead,
                        });
                    }
                    lead_cmd = if full_drive {
                        100.0
                    } else if self.slots[idx].unit.status() == UnitStatus::Running {
                        lead_pct
                    } else {
                        demand_pct
                    };
                    self.slots[idx].unit.set_command(lead_cmd);
                }
                Role::Lag => {
                    let cmd = if self.slots[idx].unit.is_active() {
                        lead_cmd
                    } else {
                        0.0
                    };
                    self.slots[idx].unit.set_command(cmd);
                }
                Role::Standby => {
                    if self.stop_unit(idx) {
                        debug!(unit = %self.id(idx), "standby unit stopped");
                        self.events.push(SequencerEvent::UnitStopped { unit: self.id(idx) });
                    }
                    self.slots[idx].unit.set_command(0.0);
                }
            }
        }
        for slot in &mut self.slots {
            if !slot.unit.is_in_service() {
                slot.unit.set_command(0.0);
            }
        }
    }
}
