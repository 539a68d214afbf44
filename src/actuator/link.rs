use std::io::Write;
use std::time::Duration;

use crate::error::{TrackerError, TrackerResult};

/// Port name that asks for USB-serial auto-detection.
pub const AUTO_PORT: &str = "auto";

/// USB descriptor fragments of the bridges found on Arduino/ESP32 boards.
const USB_SERIAL_IDENTIFIERS: [&str; 5] = ["Silicon Labs", "CP210", "CH340", "FTDI", "USB2.0-Serial"];

/// Settings for the serial actuator link (8N1).
#[derive(Clone, Debug)]
pub struct SerialSettings {
    /// Device path (e.g. "/dev/ttyUSB0", "COM8") or `auto`.
    pub port: String,
    pub baud: u32,
    /// Write timeout.
    pub timeout: Duration,
    /// Delay after opening; boards reset when the port opens.
    pub settle: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 115_200,
            timeout: Duration::from_secs(1),
            settle: Duration::from_millis(2000),
        }
    }
}

/// The actuator link: an open byte sink or nothing at all.
pub enum Link {
    Connected {
        name: String,
        port: Box<dyn Write + Send>,
    },
    Absent,
}

impl Link {
    /// Open the serial port. Never fails: any error yields `Link::Absent`.
    pub fn open(settings: &SerialSettings) -> Link {
        match Link::try_open(settings) {
            Ok(link) => link,
            Err(err) => {
                log::warn!("Link: {}; running without actuator", err);
                Link::Absent
            }
        }
    }

    /// Open the serial port, resolving `auto` to the first USB-serial bridge.
    pub fn try_open(settings: &SerialSettings) -> TrackerResult<Link> {
        let port_name = if settings.port.eq_ignore_ascii_case(AUTO_PORT) {
            let name = find_usb_serial_port()
                .ok_or_else(|| TrackerError::Link("no USB serial bridge found".to_string()))?;
            log::info!("Link: auto-detected serial port {}", name);
            name
        } else {
            settings.port.clone()
        };

        let port = serialport::new(&port_name, settings.baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(settings.timeout)
            .open()
            .map_err(|e| TrackerError::Link(format!("could not open serial port {}: {}", port_name, e)))?;
        if !settings.settle.is_zero() {
            std::thread::sleep(settings.settle);
        }
        log::info!("Link: serial connected on {} @ {} baud", port_name, settings.baud);
        Ok(Link::Connected {
            name: port_name,
            port: Box::new(port),
        })
    }

    /// Wrap an already open writer (tests, alternate transports).
    pub fn connected(name: impl Into<String>, port: Box<dyn Write + Send>) -> Link {
        Link::Connected {
            name: name.into(),
            port,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Link::Connected { .. })
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Link::Connected { name, .. } => Some(name),
            Link::Absent => None,
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Link::Connected { name, .. } => write!(f, "Link::Connected({})", name),
            Link::Absent => f.write_str("Link::Absent"),
        }
    }
}

/// First port whose USB descriptors look like an Arduino/ESP32 bridge.
fn find_usb_serial_port() -> Option<String> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            log::warn!("Link: failed to enumerate serial ports: {}", e);
            return None;
        }
    };
    ports.into_iter().find_map(|info| {
        let serialport::SerialPortType::UsbPort(usb) = &info.port_type else {
            return None;
        };
        let description = format!(
            "{} {}",
            usb.manufacturer.as_deref().unwrap_or_default(),
            usb.product.as_deref().unwrap_or_default()
        );
        log::debug!("Link: found {} - {}", info.port_name, description.trim());
        is_usb_serial_bridge(&description).then(|| info.port_name.clone())
    })
}

/// True when a USB descriptor string names a known USB-serial bridge.
pub fn is_usb_serial_bridge(description: &str) -> bool {
    USB_SERIAL_IDENTIFIERS
        .iter()
        .any(|id| description.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_port_degrades_to_absent() {
        let settings = SerialSettings {
            port: "/dev/definitely-not-a-tty".to_string(),
            settle: Duration::ZERO,
            ..SerialSettings::default()
        };
        let link = Link::open(&settings);
        assert!(!link.is_connected());
        assert!(link.name().is_none());
    }

    #[test]
    fn try_open_reports_link_error() {
        let settings = SerialSettings {
            port: "/dev/definitely-not-a-tty".to_string(),
            settle: Duration::ZERO,
            ..SerialSettings::default()
        };
        let err = Link::try_open(&settings).unwrap_err();
        assert!(matches!(err, TrackerError::Link(_)));
        assert!(err.to_string().contains("/dev/definitely-not-a-tty"));
    }

    #[test]
    fn recognizes_bridge_descriptors() {
        assert!(is_usb_serial_bridge("Silicon Labs CP2102 USB to UART Bridge"));
        assert!(is_usb_serial_bridge("QinHeng USB2.0-Serial"));
        assert!(!is_usb_serial_bridge("Logitech Webcam C920"));
    }
}
