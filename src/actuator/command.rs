use std::fmt;

use crate::track::{ActuatorState, ANGLE_MAX};

/// One line of the actuator wire protocol: `X:<int>,Y:<int>,Z:<float,2dp>\n`.
///
/// There is no acknowledgement; each line carries the full target pose.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActuatorCommand {
    pub x: u8,
    pub y: u8,
    pub z: f64,
}

impl ActuatorCommand {
    pub fn new(x: u8, y: u8, z: f64) -> Self {
        let z = if z.is_finite() { z.clamp(0.0, 1.0) } else { 1.0 };
        Self {
            x: x.min(ANGLE_MAX),
            y: y.min(ANGLE_MAX),
            z,
        }
    }

    /// Encoded line, newline-terminated.
    pub fn encode(&self) -> String {
        format!("X:{},Y:{},Z:{:.2}\n", self.x, self.y, self.z)
    }
}

impl From<&ActuatorState> for ActuatorCommand {
    fn from(state: &ActuatorState) -> Self {
        Self::new(state.angle_x, state.angle_y, state.depth)
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{},Y:{},Z:{:.2}", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::GripperState;

    #[test]
    fn encodes_reference_line() {
        let state = ActuatorState {
            angle_x: 42,
            angle_y: 124,
            depth: 1.0 - 8000.0 / 182_320.0,
            gripper: GripperState::Open,
        };
        assert_eq!(ActuatorCommand::from(&state).encode(), "X:42,Y:124,Z:0.96\n");
    }

    #[test]
    fn clamps_out_of_range_fields() {
        let cmd = ActuatorCommand::new(200, 181, 3.5);
        assert_eq!(cmd.encode(), "X:180,Y:180,Z:1.00\n");
        assert_eq!(ActuatorCommand::new(0, 0, -0.2).encode(), "X:0,Y:0,Z:0.00\n");
    }

    #[test]
    fn display_omits_terminator() {
        assert_eq!(ActuatorCommand::new(90, 90, 0.5).to_string(), "X:90,Y:90,Z:0.50");
    }
}
