use std::io::Write;

use crate::actuator::command::ActuatorCommand;
use crate::actuator::link::{Link, SerialSettings};
use crate::track::{ActuatorState, GripperState};

/// What happened to one command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Line written to the link.
    Written,
    /// No link; nothing written. Not an error.
    Skipped,
    /// The write failed. Logged; the next cycle sends fresh state.
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub written: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Fire-and-forget command writer over an optional serial link.
///
/// There is no retry queue: a failed line is gone and the next `send`
/// carries the newest pose.
pub struct ActuatorChannel {
    link: Link,
    stats: ChannelStats,
    // Inside a run of consecutive write failures.
    failing: bool,
    last_gripper: Option<GripperState>,
    last_command: Option<ActuatorCommand>,
}

impl ActuatorChannel {
    pub fn new(link: Link) -> Self {
        Self {
            link,
            stats: ChannelStats::default(),
            failing: false,
            last_gripper: None,
            last_command: None,
        }
    }

    /// Open the serial port best-effort.
    pub fn open(settings: &SerialSettings) -> Self {
        Self::new(Link::open(settings))
    }

    /// Channel with no hardware attached.
    pub fn headless() -> Self {
        Self::new(Link::Absent)
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn last_command(&self) -> Option<ActuatorCommand> {
        self.last_command
    }

    /// Send a full actuator state, logging gripper transitions.
    pub fn send_state(&mut self, state: &ActuatorState) -> SendOutcome {
        if self.last_gripper != Some(state.gripper) {
            log::info!(
                "ActuatorChannel: gripper {} (depth {:.2})",
                state.gripper,
                state.depth
            );
            self.last_gripper = Some(state.gripper);
        }
        self.send(state.angle_x, state.angle_y, state.depth)
    }

    /// Encode and write one command line.
    pub fn send(&mut self, angle_x: u8, angle_y: u8, depth: f64) -> SendOutcome {
        let command = ActuatorCommand::new(angle_x, angle_y, depth);
        self.last_command = Some(command);
        log::debug!("ActuatorChannel: command {}", command);

        let Link::Connected { name, port } = &mut self.link else {
            self.stats.skipped += 1;
            log::trace!("ActuatorChannel: no link, skipping {}", command);
            return SendOutcome::Skipped;
        };

        let line = command.encode();
        let written = port
            .write_all(line.as_bytes())
            .and_then(|_| port.flush());
        match written {
            Ok(()) => {
                if self.failing {
                    log::info!("ActuatorChannel: writes to {} recovered", name);
                    self.failing = false;
                }
                self.stats.written += 1;
                SendOutcome::Written
            }
            Err(e) => {
                if self.failing {
                    log::debug!("ActuatorChannel: write to {} failed again: {}", name, e);
                } else {
                    log::warn!("ActuatorChannel: write to {} failed: {}", name, e);
                    self.failing = true;
                }
                self.stats.failed += 1;
                SendOutcome::Failed
            }
        }
    }

    /// Release the link. Later sends are skipped.
    pub fn close(&mut self) {
        if let Link::Connected { name, mut port } = std::mem::replace(&mut self.link, Link::Absent) {
            if let Err(e) = port.flush() {
                log::debug!("ActuatorChannel: flush on close failed: {}", e);
            }
            log::info!("ActuatorChannel: serial connection {} closed", name);
        }
    }
}

impl Drop for ActuatorChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Fails the first `failures` writes, then succeeds.
    struct FlakyPort {
        failures: usize,
        inner: SharedBuf,
    }

    impl Write for FlakyPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_wire_lines() {
        let buf = SharedBuf::default();
        let mut channel = ActuatorChannel::new(Link::connected("mem", Box::new(buf.clone())));
        assert_eq!(channel.send(42, 124, 0.956), SendOutcome::Written);
        assert_eq!(channel.send(90, 90, 0.05), SendOutcome::Written);
        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "X:42,Y:124,Z:0.96\nX:90,Y:90,Z:0.05\n");
        assert_eq!(channel.stats().written, 2);
    }

    #[test]
    fn absent_link_is_a_quiet_no_op() {
        let mut channel = ActuatorChannel::headless();
        assert_eq!(channel.send(10, 20, 0.5), SendOutcome::Skipped);
        assert_eq!(channel.stats().skipped, 1);
        assert_eq!(channel.last_command(), Some(ActuatorCommand::new(10, 20, 0.5)));
    }

    #[test]
    fn write_failures_are_absorbed_and_recover() {
        let buf = SharedBuf::default();
        let port = FlakyPort {
            failures: 2,
            inner: buf.clone(),
        };
        let mut channel = ActuatorChannel::new(Link::connected("flaky", Box::new(port)));
        assert_eq!(channel.send(1, 1, 1.0), SendOutcome::Failed);
        assert_eq!(channel.send(2, 2, 1.0), SendOutcome::Failed);
        assert_eq!(channel.send(3, 3, 1.0), SendOutcome::Written);
        assert!(channel.is_connected());
        // Failed lines are not replayed.
        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "X:3,Y:3,Z:1.00\n");
        assert_eq!(channel.stats().failed, 2);
    }

    #[test]
    fn close_releases_link_once() {
        let buf = SharedBuf::default();
        let mut channel = ActuatorChannel::new(Link::connected("mem", Box::new(buf)));
        channel.close();
        assert!(!channel.is_connected());
        channel.close();
        assert_eq!(channel.send(0, 0, 0.0), SendOutcome::Skipped);
    }
}
