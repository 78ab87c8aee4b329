//! Per-process enumeration from /proc/[pid]/stat.

use crate::error::{InitError, SampleError};
use crate::export::round2;
use crate::probes::Probe;
use crate::registry::{CpuBasis, ProcessObservation, ProcessRegistry};
use serde::Serialize;
use std::fs;
use std::time::Instant;

const PROC: &str = "/proc";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize, Default)]
pub struct ProcessReading {
    pub name: String,
    pub pid: u32,
    /// CPU usage percentage on the configured normalization basis.
    #[serde(rename = "cpuUsage", serialize_with = "round2")]
    pub cpu_usage: f64,
    /// Resident memory in MB.
    #[serde(rename = "memoryUsage", serialize_with = "round2")]
    pub memory_usage: f64,
}

/// Process probe feeding cumulative CPU times through a ProcessRegistry.
pub struct ProcessProbe {
    registry: ProcessRegistry,
    page_size: u64,
}

impl ProcessProbe {
    pub fn new(basis: CpuBasis) -> Self {
        let ticks_per_sec = unsafe { libc::sysconf(libc::_SC_CLK_TCK) as u64 };
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u64 };
        Self {
            registry: ProcessRegistry::new(ticks_per_sec, basis),
            page_size,
        }
    }
}

impl Probe for ProcessProbe {
    type Reading = Vec<ProcessReading>;

    const DOMAIN: &'static str = "process";

    fn initialize(&mut self) -> Result<(), InitError> {
        fs::read_dir(PROC)
            .map_err(|e| InitError::new(Self::DOMAIN, SampleError::read(PROC, e)))?;
        Ok(())
    }

    fn sample(&mut self, now: Instant) -> Result<Vec<ProcessReading>, SampleError> {
        let entries = fs::read_dir(PROC).map_err(|e| SampleError::read(PROC, e))?;

        let mut observations = Vec::new();
        for entry in entries.flatten() {
            let pid: u32 = match entry.file_name().to_str().and_then(|s| s.parse().ok()) {
                Some(pid) => pid,
                None => continue,
            };

            // A process can exit between enumeration and the stat read;
            // it simply drops out of this tick.
            let stat = match fs::read_to_string(entry.path().join("stat")) {
                Ok(stat) => stat,
                Err(_) => continue,
            };
            let parsed = match parse_pid_stat(&stat) {
                Some(parsed) => parsed,
                None => continue,
            };

            observations.push(ProcessObservation {
                pid,
                name: parsed.name,
                cpu_time_ticks: parsed.cpu_time_ticks,
                memory_bytes: parsed.rss_pages * self.page_size,
            });
        }

        let percents = self.registry.update(&observations, now);

        Ok(observations
            .into_iter()
            .map(|obs| ProcessReading {
                cpu_usage: percents.get(&obs.pid).copied().unwrap_or(0.0),
                name: obs.name,
                pid: obs.pid,
                memory_usage: obs.memory_bytes as f64 / BYTES_PER_MB,
            })
            .collect())
    }
}

struct PidStat {
    name: String,
    cpu_time_ticks: u64,
    rss_pages: u64,
}

/// Parse one /proc/[pid]/stat line.
///
/// The comm field is parenthesized and may itself contain spaces and
/// parentheses, so the fields after it are located from the last ')'.
fn parse_pid_stat(stat: &str) -> Option<PidStat> {
    let comm_start = stat.find('(')?;
    let comm_end = stat.rfind(')')?;
    let name = stat.get(comm_start + 1..comm_end)?.to_string();

    let fields: Vec<&str> = stat.get(comm_end + 2..)?.split_whitespace().collect();

    // Zero-indexed from the state field: utime = 11, stime = 12,
    // rss (in pages) = 21.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    let rss_pages: u64 = fields.get(21).and_then(|s| s.parse().ok()).unwrap_or(0);

    Some(PidStat {
        name,
        cpu_time_ticks: utime + stime,
        rss_pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "1234 (some proc) S 1 1234 1234 0 -1 4194560 500 0 0 0 \
                        150 350 0 0 20 0 4 0 100 10000000 2048 18446744073709551615 \
                        0 0 0 0 0 0 0 0 0 0 0 0 17 3 0 0 0 0 0";

    #[test]
    fn parses_comm_cpu_time_and_rss() {
        let parsed = parse_pid_stat(STAT).unwrap();
        assert_eq!(parsed.name, "some proc");
        assert_eq!(parsed.cpu_time_ticks, 150 + 350);
        assert_eq!(parsed.rss_pages, 2048);
    }

    #[test]
    fn comm_with_parentheses_parses_from_last_paren() {
        let stat = "42 (a) weird (comm)) R 1 42 42 0 -1 0 0 0 0 0 \
                    7 3 0 0 20 0 1 0 1 1 5 0";
        let parsed = parse_pid_stat(stat).unwrap();
        assert_eq!(parsed.name, "a) weird (comm)");
        assert_eq!(parsed.cpu_time_ticks, 10);
        assert_eq!(parsed.rss_pages, 5);
    }

    #[test]
    fn truncated_stat_is_rejected() {
        assert!(parse_pid_stat("99 (init) S 0 1").is_none());
    }
}
