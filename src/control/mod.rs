// Closed-loop building blocks
//
// - speed: PI wheel speed controller driving one motor from its encoder
// - heading: stateless heading regulator producing differential wheel references

pub mod heading;
pub mod speed;

pub use heading::{HeadingCommand, heading_control, wrap180};
pub use speed::SpeedController;
