//! List-ports command implementation.

use {
    crate::config::Config,
    console::style,
    s3flash::{DetectedPort, auto_detect_port, detect_ports},
};

fn port_json(port: &DetectedPort, config: &Config) -> serde_json::Value {
    let known = port.device.is_known()
        || matches!((port.vid, port.pid), (Some(vid), Some(pid)) if config.knows_usb_device(vid, pid));
    let mut value = serde_json::to_value(port).unwrap_or_default();
    value["known"] = serde_json::Value::Bool(known);
    value
}

/// List serial ports, as JSON on stdout or as a styled list on stderr.
pub(crate) fn cmd_list_ports(json: bool, config: &Config) {
    let detected = detect_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected.iter().map(|p| port_json(p, config)).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).unwrap_or_default()
        );
        return;
    }

    eprintln!("{}", style("Available serial ports:").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return;
    }

    for port in &detected {
        let device_type = if port.device.is_known() {
            format!(" [{}]", style(port.device.name()).yellow())
        } else {
            String::new()
        };
        let vid_pid = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
            _ => String::new(),
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{device_type}{vid_pid}{product}",
            style("•").green(),
            style(&port.name).cyan(),
        );
    }

    if let Ok(auto_port) = auto_detect_port() {
        eprintln!(
            "\n{} Auto-detected: {}",
            style("→").green().bold(),
            style(&auto_port.name).cyan().bold()
        );
    }
}

#[cfg(test)]
mod tests {
    use {super::*, s3flash::DeviceKind};

    #[test]
    fn test_port_json_fields() {
        let port = DetectedPort {
            device: DeviceKind::EspressifUsb,
            vid: Some(0x303A),
            pid: Some(0x1001),
            product: Some("USB JTAG/serial debug unit".into()),
            ..DetectedPort::unknown("/dev/ttyACM0")
        };
        let value = port_json(&port, &Config::default());
        assert_eq!(value["name"], "/dev/ttyACM0");
        assert_eq!(value["device"], "Espressif USB-Serial/JTAG");
        assert_eq!(value["vid"], 0x303A);
        assert_eq!(value["known"], true);
    }

    #[test]
    fn test_port_json_known_from_config() {
        let port = DetectedPort {
            vid: Some(0xABCD),
            pid: Some(0x0001),
            ..DetectedPort::unknown("/dev/ttyUSB3")
        };
        let mut config = Config::default();
        assert_eq!(port_json(&port, &config)["known"], false);

        config.port.usb_device.push(crate::config::UsbDevice {
            vid: 0xABCD,
            pid: 0x0001,
        });
        assert_eq!(port_json(&port, &config)["known"], true);
    }
}
