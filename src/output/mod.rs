//! Observers of the fixture registry.

pub mod control;
pub mod moving_head;
pub mod status;
pub mod table;

pub use self::control::{ControlForm, ControlSink, LogSink};
pub use self::moving_head::{Bulb, MovingHeadOutput, MovingHeadView};
pub use self::status::{LightStatus, StatusMessage};
pub use self::table::{Row, TableOutput};
