//! Mounted-volume capacity and throughput from /proc/mounts, statvfs and
//! /proc/diskstats.

use crate::error::{InitError, SampleError};
use crate::export::round2;
use crate::probes::Probe;
use crate::rate::RateTracker;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::ffi::CString;
use std::fs;
use std::mem::MaybeUninit;
use std::time::Instant;

const PROC_MOUNTS: &str = "/proc/mounts";
const PROC_DISKSTATS: &str = "/proc/diskstats";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const SECTOR_SIZE: u64 = 512;

#[derive(Debug, Clone, Serialize, Default)]
pub struct DiskReading {
    /// Device name (e.g. "sda1", "nvme0n1p2").
    pub name: String,
    #[serde(rename = "mountPoint")]
    pub mount_point: String,
    /// Capacity in GB.
    #[serde(serialize_with = "round2")]
    pub total: f64,
    #[serde(serialize_with = "round2")]
    pub used: f64,
    /// Space available to unprivileged callers, in GB.
    #[serde(serialize_with = "round2")]
    pub free: f64,
    /// Read throughput in MB/s.
    #[serde(rename = "readSpeed", serialize_with = "round2")]
    pub read_speed: f64,
    /// Write throughput in MB/s.
    #[serde(rename = "writeSpeed", serialize_with = "round2")]
    pub write_speed: f64,
}

struct IoTrackers {
    read: RateTracker,
    write: RateTracker,
}

/// Disk probe owning one pair of RateTrackers per observed device.
#[derive(Default)]
pub struct DiskProbe {
    io_rates: HashMap<String, IoTrackers>,
}

impl DiskProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Probe for DiskProbe {
    type Reading = Vec<DiskReading>;

    const DOMAIN: &'static str = "disk";

    fn initialize(&mut self) -> Result<(), InitError> {
        fs::read_to_string(PROC_MOUNTS)
            .map_err(|e| InitError::new(Self::DOMAIN, SampleError::read(PROC_MOUNTS, e)))?;
        Ok(())
    }

    fn sample(&mut self, now: Instant) -> Result<Vec<DiskReading>, SampleError> {
        let mounts = fs::read_to_string(PROC_MOUNTS)
            .map_err(|e| SampleError::read(PROC_MOUNTS, e))?;
        // Sector counters are a best-effort enrichment; a host without
        // /proc/diskstats still reports capacities with zero speeds.
        let diskstats = fs::read_to_string(PROC_DISKSTATS).unwrap_or_default();
        let sectors = parse_diskstats(&diskstats);

        let mut readings = Vec::new();
        let mut seen = HashSet::new();

        for (device, mount_point) in parse_mounts(&mounts) {
            if !seen.insert(device.clone()) {
                // Bind mounts repeat the device; report it once.
                continue;
            }

            // A vanished or unreadable volume excludes itself, not the probe.
            let (total_bytes, free_bytes) = match statvfs(&mount_point) {
                Some(v) => v,
                None => continue,
            };

            let (read_speed, write_speed) = match sectors.get(device.as_str()) {
                Some(&(read_sectors, written_sectors)) => {
                    let trackers = self.io_rates.entry(device.clone()).or_insert_with(|| {
                        IoTrackers {
                            read: RateTracker::new(),
                            write: RateTracker::new(),
                        }
                    });
                    (
                        trackers.read.observe(read_sectors * SECTOR_SIZE, now) / BYTES_PER_MB,
                        trackers.write.observe(written_sectors * SECTOR_SIZE, now) / BYTES_PER_MB,
                    )
                }
                None => (0.0, 0.0),
            };

            let total = total_bytes as f64 / BYTES_PER_GB;
            let free = free_bytes as f64 / BYTES_PER_GB;
            readings.push(DiskReading {
                name: device,
                mount_point,
                total,
                used: total - free,
                free,
                read_speed,
                write_speed,
            });
        }

        // Drop trackers for devices that are no longer mounted so a later
        // remount starts from a fresh baseline.
        self.io_rates.retain(|device, _| seen.contains(device));

        Ok(readings)
    }
}

/// (device basename, mount point) for every /dev/-backed mount.
fn parse_mounts(mounts: &str) -> Vec<(String, String)> {
    mounts
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let device = parts.next()?;
            let mount_point = parts.next()?;
            if !device.starts_with("/dev/") || device.starts_with("/dev/loop") {
                return None;
            }
            let name = device.rsplit('/').next()?.to_string();
            Some((name, unescape_mount_path(mount_point)))
        })
        .collect()
}

/// /proc/mounts octal-escapes spaces, tabs and backslashes in paths.
fn unescape_mount_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let code: String = chars.by_ref().take(3).collect();
        match u8::from_str_radix(&code, 8) {
            Ok(byte) => out.push(byte as char),
            Err(_) => {
                out.push('\\');
                out.push_str(&code);
            }
        }
    }
    out
}

/// device name -> (sectors read, sectors written).
fn parse_diskstats(diskstats: &str) -> HashMap<String, (u64, u64)> {
    diskstats
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 10 {
                return None;
            }
            let read_sectors = parts[5].parse().ok()?;
            let written_sectors = parts[9].parse().ok()?;
            Some((parts[2].to_string(), (read_sectors, written_sectors)))
        })
        .collect()
}

/// (total bytes, bytes available to unprivileged callers) for a mount point.
fn statvfs(mount_point: &str) -> Option<(u64, u64)> {
    let c_path = CString::new(mount_point).ok()?;
    let mut buf = MaybeUninit::<libc::statvfs>::uninit();

    let result = unsafe { libc::statvfs(c_path.as_ptr(), buf.as_mut_ptr()) };
    if result != 0 {
        return None;
    }

    let buf = unsafe { buf.assume_init() };
    let block_size = buf.f_frsize as u64;
    Some((buf.f_blocks as u64 * block_size, buf.f_bavail as u64 * block_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTS: &str = "\
sysfs /sys sysfs rw,nosuid 0 0
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
/dev/nvme0n1p1 /boot/efi vfat rw 0 0
/dev/nvme0n1p2 /var/lib/docker ext4 rw,relatime 0 0
/dev/loop3 /snap/core/1234 squashfs ro 0 0
tmpfs /tmp tmpfs rw 0 0
/dev/sdb1 /mnt/data\\040disk ext4 rw 0 0
";

    #[test]
    fn keeps_only_dev_backed_mounts() {
        let mounts = parse_mounts(MOUNTS);
        let names: Vec<&str> = mounts.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(names, ["nvme0n1p2", "nvme0n1p1", "nvme0n1p2", "sdb1"]);
    }

    #[test]
    fn unescapes_octal_mount_paths() {
        let mounts = parse_mounts(MOUNTS);
        assert_eq!(mounts.last().unwrap().1, "/mnt/data disk");
    }

    #[test]
    fn diskstats_maps_device_to_sector_counters() {
        let stats = parse_diskstats(
            " 259       0 nvme0n1 1000 0 480000 100 2000 0 960000 200 0 300 300\n\
             2599 nvme0n1 short line\n",
        );
        assert_eq!(stats.get("nvme0n1"), Some(&(480_000, 960_000)));
        assert_eq!(stats.len(), 1);
    }
}
