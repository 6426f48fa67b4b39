use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use controller::Role;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sim::{ActuatorFault, SensorFault};

use crate::control_fault::ControlFault;

/// Operator or scenario command, applied at the next tick boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    SetSetpoint { celsius: f64 },
    SetItLoad { kw: f64 },
    FailUnit { unit: String },
    InjectActuatorFault { unit: String, fault: ActuatorFault },
    ClearActuatorFault { unit: String },
    SetMaintenance { unit: String, enabled: bool },
    ReturnToService { unit: String },
    AcknowledgeAlarm { alarm: String },
    ResetAlarm { alarm: String },
    AssignRole { unit: String, role: Role },
    InjectSensorFault { sensor: usize, fault: SensorFault },
    ClearSensorFault { sensor: usize },
    InjectControlFault { fault: ControlFault },
    ClearControlFault,
}

/// Cloneable handle for enqueueing commands from any thread.
#[derive(Clone, Debug, Default)]
pub struct CommandSender {
    queue: Arc<Mutex<VecDeque<Command>>>,
}

impl CommandSender {
    pub fn send(&self, command: Command) {
        self.queue.lock().push_back(command);
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Everything queued so far, in arrival order. Commands sent while the
    /// drain runs land in the next batch.
    pub(crate) fn drain(&self) -> Vec<Command> {
        Vec::from(std::mem::take(&mut *self.queue.lock()))
    }
}

/// Cooperative cancellation, checked between ticks.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
