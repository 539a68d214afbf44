//! Actuator output: wire encoding, serial link, command channel.
//!
//! The link is optional hardware. With no port the channel still accepts
//! every command and reports it as skipped, so the tracker runs headless.

mod channel;
mod command;
mod link;

pub use channel::{ActuatorChannel, ChannelStats, SendOutcome};
pub use command::ActuatorCommand;
pub use link::{is_usb_serial_bridge, Link, SerialSettings, AUTO_PORT};
