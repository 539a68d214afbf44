//! serial_probe - bring-up tool for the arm controller link
//!
//! Lists serial ports, resolves `auto` the way trackerd does, and sends
//! commands by hand: one from flags, or one per stdin line (`x y z`).

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::time::Duration;

use arm_tracker::actuator::{is_usb_serial_bridge, AUTO_PORT};
use arm_tracker::{ActuatorChannel, Link, SendOutcome, SerialSettings};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// List available serial ports and exit.
    #[arg(long)]
    list: bool,
    /// Serial port, or "auto" to pick the first USB-serial bridge.
    #[arg(long, env = "TRACKER_SERIAL_PORT", default_value = AUTO_PORT)]
    port: String,
    #[arg(long, env = "TRACKER_SERIAL_BAUD", default_value_t = 115_200)]
    baud: u32,
    /// Milliseconds to wait after opening (the board resets on open).
    #[arg(long, default_value_t = 2000)]
    settle_ms: u64,
    /// Send a single command: base angle 0-180.
    #[arg(long, requires_all = ["y", "z"])]
    x: Option<u8>,
    /// Shoulder angle 0-180.
    #[arg(long, requires_all = ["x", "z"])]
    y: Option<u8>,
    /// Depth 0.0-1.0.
    #[arg(long, requires_all = ["x", "y"])]
    z: Option<f64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list {
        return list_ports();
    }

    let settings = SerialSettings {
        port: args.port.clone(),
        baud: args.baud,
        settle: Duration::from_millis(args.settle_ms),
        ..SerialSettings::default()
    };
    let link = Link::try_open(&settings)?;
    let mut channel = ActuatorChannel::new(link);

    if let (Some(x), Some(y), Some(z)) = (args.x, args.y, args.z) {
        report(&mut channel, x, y, z)?;
        channel.close();
        return Ok(());
    }

    log::info!("serial_probe: reading `x y z` lines from stdin");
    for line in std::io::stdin().lock().lines() {
        let line = line.context("read stdin")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_command(line) {
            Ok((x, y, z)) => report(&mut channel, x, y, z)?,
            Err(err) => log::warn!("serial_probe: skipping '{}': {}", line, err),
        }
    }
    channel.close();
    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = serialport::available_ports().context("enumerate serial ports")?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for info in ports {
        match &info.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                let description = format!(
                    "{} {}",
                    usb.manufacturer.as_deref().unwrap_or_default(),
                    usb.product.as_deref().unwrap_or_default()
                );
                let marker = if is_usb_serial_bridge(&description) {
                    " [bridge]"
                } else {
                    ""
                };
                println!(
                    "{}  usb {:04x}:{:04x} {}{}",
                    info.port_name,
                    usb.vid,
                    usb.pid,
                    description.trim(),
                    marker
                );
            }
            other => println!("{}  {:?}", info.port_name, other),
        }
    }
    Ok(())
}

fn report(channel: &mut ActuatorChannel, x: u8, y: u8, z: f64) -> Result<()> {
    match channel.send(x, y, z) {
        SendOutcome::Written => {
            if let Some(command) = channel.last_command() {
                println!("sent {}", command);
            }
            Ok(())
        }
        SendOutcome::Skipped => Err(anyhow!("link closed")),
        SendOutcome::Failed => Err(anyhow!("write failed")),
    }
}

/// Parse `x y z` (whitespace or comma separated).
fn parse_command(line: &str) -> Result<(u8, u8, f64)> {
    let fields: Vec<&str> = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|field| !field.is_empty())
        .collect();
    let [x, y, z] = fields.as_slice() else {
        return Err(anyhow!("expected 3 fields, got {}", fields.len()));
    };
    let x: u8 = x.parse().map_err(|_| anyhow!("bad x '{}'", x))?;
    let y: u8 = y.parse().map_err(|_| anyhow!("bad y '{}'", y))?;
    let z: f64 = z.parse().map_err(|_| anyhow!("bad z '{}'", z))?;
    Ok((x, y, z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_space_and_comma_separated_lines() {
        assert_eq!(parse_command("90 45 0.5").unwrap(), (90, 45, 0.5));
        assert_eq!(parse_command("10, 20, 1").unwrap(), (10, 20, 1.0));
        assert!(parse_command("10 20").is_err());
        assert!(parse_command("300 20 0.1").is_err());
    }
}
