//! Physical leaf models: the thermal room, the CRAC units cooling it and the
//! temperature sensors watching it.

mod crac;
mod room;
mod sensor;

pub use crac::{ActuatorFault, CracParams, CracUnit, UnitState, UnitStatus};
pub use room::{Room, RoomParams};
pub use sensor::{Sensor, SensorFault};
