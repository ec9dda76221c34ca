// Behavior layer: line following, obstacle escape and return home.
//
// The state machine is stepped once per behavior period. Every wait is a
// condition re-checked on the next step, so a step never blocks.

mod machine;
mod state;

pub use machine::{BehaviorStateMachine, NavSensors};
pub use state::{AvoidLeg, BehaviorState, HomeLeg};
