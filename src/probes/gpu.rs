//! Best-effort GPU readings from DRM sysfs and the NVIDIA procfs tree.
//!
//! No vendor SDK is consulted. Whatever the host kernel exposes is reported;
//! every field the platform does not expose is the 0.0 sentinel.

use crate::error::{InitError, SampleError};
use crate::export::round2;
use crate::probes::Probe;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize)]
pub struct GpuReading {
    pub name: String,
    /// Utilization percentage, 0.0 when the driver does not expose it.
    #[serde(serialize_with = "round2")]
    pub usage: f64,
    /// VRAM used in MB.
    #[serde(rename = "memoryUsed", serialize_with = "round2")]
    pub memory_used: f64,
    /// VRAM total in MB.
    #[serde(rename = "memoryTotal", serialize_with = "round2")]
    pub memory_total: f64,
    /// Temperature in Celsius.
    #[serde(serialize_with = "round2")]
    pub temperature: f64,
}

impl Default for GpuReading {
    fn default() -> Self {
        Self {
            name: "Unknown".to_string(),
            usage: 0.0,
            memory_used: 0.0,
            memory_total: 0.0,
            temperature: 0.0,
        }
    }
}

/// GPU probe. The inventory name is resolved once at initialization and
/// cached for the probe's lifetime; counters are re-read each tick.
#[derive(Debug, Default)]
pub struct GpuProbe {
    name: String,
    device: Option<PathBuf>,
}

impl GpuProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Probe for GpuProbe {
    type Reading = GpuReading;

    const DOMAIN: &'static str = "gpu";

    /// Never fails: a host without a GPU reports the "Unknown" inventory
    /// name and sentinel counters rather than blocking startup.
    fn initialize(&mut self) -> Result<(), InitError> {
        self.device = find_drm_device();
        self.name = detect_name(self.device.as_deref());
        Ok(())
    }

    fn sample(&mut self, _now: Instant) -> Result<GpuReading, SampleError> {
        let mut reading = GpuReading {
            name: self.name.clone(),
            ..GpuReading::default()
        };

        if let Some(device) = &self.device {
            reading.usage = read_sysfs_f64(&device.join("gpu_busy_percent")).unwrap_or(0.0);
            reading.memory_used = read_sysfs_f64(&device.join("mem_info_vram_used"))
                .map(|b| b / BYTES_PER_MB)
                .unwrap_or(0.0);
            reading.memory_total = read_sysfs_f64(&device.join("mem_info_vram_total"))
                .map(|b| b / BYTES_PER_MB)
                .unwrap_or(0.0);
            reading.temperature = read_hwmon_temp(device).unwrap_or(0.0);
        }

        Ok(reading)
    }
}

/// First DRM card device directory, if the host has one.
fn find_drm_device() -> Option<PathBuf> {
    let entries = fs::read_dir("/sys/class/drm").ok()?;
    let mut cards: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            // Connector entries look like "card0-HDMI-A-1"; skip those.
            name.starts_with("card") && !name.contains('-')
        })
        .map(|e| e.path().join("device"))
        .filter(|p| p.exists())
        .collect();
    cards.sort();
    cards.into_iter().next()
}

fn detect_name(device: Option<&Path>) -> String {
    if let Some(name) = nvidia_model_name() {
        return name;
    }

    // Fall back to the bound kernel driver, which at least identifies the
    // vendor stack ("amdgpu", "i915", "nouveau").
    if let Some(device) = device {
        if let Ok(uevent) = fs::read_to_string(device.join("uevent")) {
            for line in uevent.lines() {
                if let Some(driver) = line.strip_prefix("DRIVER=") {
                    return driver.trim().to_string();
                }
            }
        }
    }

    "Unknown".to_string()
}

/// Model line from /proc/driver/nvidia/gpus/<addr>/information.
fn nvidia_model_name() -> Option<String> {
    let entries = fs::read_dir("/proc/driver/nvidia/gpus").ok()?;
    for entry in entries.flatten() {
        let info = fs::read_to_string(entry.path().join("information")).ok()?;
        for line in info.lines() {
            if let Some(model) = line.strip_prefix("Model:") {
                return Some(model.trim().to_string());
            }
        }
    }
    None
}

fn read_sysfs_f64(path: &Path) -> Option<f64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// temp1_input from the device's hwmon directory, in millidegrees Celsius.
fn read_hwmon_temp(device: &Path) -> Option<f64> {
    let entries = fs::read_dir(device.join("hwmon")).ok()?;
    for entry in entries.flatten() {
        if let Some(milli) = read_sysfs_f64(&entry.path().join("temp1_input")) {
            return Some(milli / 1000.0);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reading_uses_unknown_inventory_name() {
        let reading = GpuReading::default();
        assert_eq!(reading.name, "Unknown");
        assert_eq!(reading.usage, 0.0);
        assert_eq!(reading.memory_total, 0.0);
    }

    #[test]
    fn probe_without_device_samples_sentinels() {
        let mut probe = GpuProbe {
            name: "Unknown".to_string(),
            device: None,
        };
        let reading = probe.sample(Instant::now()).unwrap();
        assert_eq!(reading.name, "Unknown");
        assert_eq!(reading.temperature, 0.0);
    }
}
