//! Host health readings for heartbeats.

use netpulse_core::ports::DeviceMonitor;
use sysinfo::Networks;

/// Reads battery and network transport from the host.
///
/// Battery comes from sysfs on Linux; hosts without a battery report 1.0
/// (mains powered). The transport is inferred from the name of the busiest
/// non-loopback interface.
pub struct SystemMonitor;

impl SystemMonitor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceMonitor for SystemMonitor {
    fn battery_level(&self) -> f64 {
        read_sysfs_battery().unwrap_or(1.0)
    }

    fn network_type(&self) -> String {
        let networks = Networks::new_with_refreshed_list();
        let busiest = networks
            .iter()
            .filter(|(name, _)| *name != "lo")
            .max_by_key(|(_, data)| data.total_received() + data.total_transmitted())
            .map(|(name, _)| name.as_str());

        match busiest {
            Some(name) => classify_interface(name).to_string(),
            None => "unknown".to_string(),
        }
    }
}

fn read_sysfs_battery() -> Option<f64> {
    let entries = std::fs::read_dir("/sys/class/power_supply").ok()?;
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with("BAT") {
            continue;
        }
        let capacity = std::fs::read_to_string(entry.path().join("capacity")).ok()?;
        let percent: f64 = capacity.trim().parse().ok()?;
        return Some((percent / 100.0).clamp(0.0, 1.0));
    }
    None
}

fn classify_interface(name: &str) -> &'static str {
    if name.starts_with("wl") {
        "wifi"
    } else if name.starts_with("eth") || name.starts_with("en") {
        "ethernet"
    } else if name.starts_with("wwan") || name.starts_with("rmnet") || name.starts_with("ppp") {
        "cellular"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_names_classify_by_prefix() {
        assert_eq!(classify_interface("wlan0"), "wifi");
        assert_eq!(classify_interface("wlp3s0"), "wifi");
        assert_eq!(classify_interface("eth0"), "ethernet");
        assert_eq!(classify_interface("enp0s31f6"), "ethernet");
        assert_eq!(classify_interface("wwan0"), "cellular");
        assert_eq!(classify_interface("docker0"), "unknown");
    }

    #[test]
    fn battery_level_is_in_unit_range() {
        let monitor = SystemMonitor::new();
        let level = monitor.battery_level();
        assert!((0.0..=1.0).contains(&level));
    }
}
