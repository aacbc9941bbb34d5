//! Typed records for the bricks entities

mod brick;
mod brickconfig;
mod configfile;
mod task;

pub use brick::{Brick, NewBrick};
pub use brickconfig::{BrickConfig, EnvironEntry, NewBrickConfig};
pub use configfile::{ConfigFile, NewConfigFile};
pub use task::{ExecutionTask, HeartbeatReport, InstanceHealth, TaskReport};
