pub use alarms::*;
pub use controller::*;
pub use plant::*;
pub use sim::*;
