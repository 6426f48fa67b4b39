//! Control layer: the cooling PID loop and the lead/lag staging sequencer.

mod pid;
mod sequencer;
mod timer;

pub use pid::{ControlAction, PidConfig, PidController, PidTerms};
pub use sequencer::{
    FailureCause, Role, SequencerError, SequencerEvent, StageCondition, StagingConfig,
    StagingSequencer, UnitView,
};
pub use timer::{EdgeTimer, TIME_EPSILON_S};
