//! CPU utilization from /proc/stat jiffy counters.

use crate::error::{InitError, SampleError};
use crate::export::{round2, round2_vec};
use crate::probes::Probe;
use serde::Serialize;
use std::fs;
use std::time::Instant;

const PROC_STAT: &str = "/proc/stat";
const PROC_CPUINFO: &str = "/proc/cpuinfo";

/// Raw jiffy counters from one /proc/stat cpu line.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CpuTimes {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
    iowait: u64,
    irq: u64,
    softirq: u64,
    steal: u64,
}

impl CpuTimes {
    fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    fn idle(&self) -> u64 {
        self.idle + self.iowait
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CpuReading {
    /// Overall utilization percentage.
    #[serde(serialize_with = "round2")]
    pub usage: f64,
    /// Logical core count.
    pub cores: usize,
    /// Average core frequency in MHz, 0.0 when the platform does not expose it.
    #[serde(serialize_with = "round2")]
    pub frequency: f64,
    /// Per-core utilization percentages, indexed by core id.
    #[serde(rename = "coreUsage", serialize_with = "round2_vec")]
    pub core_usage: Vec<f64>,
}

/// CPU probe holding the previous tick's jiffy counters.
///
/// /proc/stat reports cumulative jiffies, so utilization is the ratio of
/// busy to total jiffies between two reads; no wall-clock interval is needed.
#[derive(Debug, Default)]
pub struct CpuProbe {
    prev_total: Option<CpuTimes>,
    prev_cores: Vec<CpuTimes>,
}

impl CpuProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_times(&self) -> Result<(CpuTimes, Vec<CpuTimes>), SampleError> {
        let content = fs::read_to_string(PROC_STAT)
            .map_err(|e| SampleError::read(PROC_STAT, e))?;
        parse_stat(&content).ok_or_else(|| SampleError::parse(PROC_STAT))
    }
}

impl Probe for CpuProbe {
    type Reading = CpuReading;

    const DOMAIN: &'static str = "cpu";

    /// Primes the jiffy baseline so the first tick already has a delta.
    fn initialize(&mut self) -> Result<(), InitError> {
        let (total, cores) = self
            .read_times()
            .map_err(|e| InitError::new(Self::DOMAIN, e))?;
        self.prev_total = Some(total);
        self.prev_cores = cores;
        Ok(())
    }

    fn sample(&mut self, _now: Instant) -> Result<CpuReading, SampleError> {
        let (total, cores) = self.read_times()?;

        let usage = match self.prev_total {
            Some(prev) => utilization(&prev, &total),
            None => 0.0,
        };
        let core_usage = cores
            .iter()
            .enumerate()
            .map(|(i, curr)| match self.prev_cores.get(i) {
                Some(prev) => utilization(prev, curr),
                None => 0.0,
            })
            .collect();

        self.prev_total = Some(total);
        self.prev_cores = cores;

        Ok(CpuReading {
            usage,
            cores: self.prev_cores.len(),
            frequency: read_frequency_mhz(),
            core_usage,
        })
    }
}

fn parse_stat(content: &str) -> Option<(CpuTimes, Vec<CpuTimes>)> {
    let mut total = None;
    let mut cores = Vec::new();

    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("cpu ") {
            total = Some(parse_cpu_line(rest));
        } else if line.starts_with("cpu") {
            // Per-core line like "cpu0", "cpu1". Cores appear in order.
            let rest = line.split_once(' ').map(|(_, r)| r).unwrap_or("");
            cores.push(parse_cpu_line(rest));
        }
    }

    total.map(|t| (t, cores))
}

fn parse_cpu_line(fields: &str) -> CpuTimes {
    let parts: Vec<u64> = fields
        .split_whitespace()
        .filter_map(|s| s.parse().ok())
        .collect();

    CpuTimes {
        user: parts.first().copied().unwrap_or(0),
        nice: parts.get(1).copied().unwrap_or(0),
        system: parts.get(2).copied().unwrap_or(0),
        idle: parts.get(3).copied().unwrap_or(0),
        iowait: parts.get(4).copied().unwrap_or(0),
        irq: parts.get(5).copied().unwrap_or(0),
        softirq: parts.get(6).copied().unwrap_or(0),
        steal: parts.get(7).copied().unwrap_or(0),
    }
}

fn utilization(prev: &CpuTimes, curr: &CpuTimes) -> f64 {
    let total_delta = curr.total().saturating_sub(prev.total());
    if total_delta == 0 {
        return 0.0;
    }
    let idle_delta = curr.idle().saturating_sub(prev.idle());
    100.0 * (1.0 - idle_delta as f64 / total_delta as f64)
}

/// Average "cpu MHz" across /proc/cpuinfo, 0.0 when unavailable.
fn read_frequency_mhz() -> f64 {
    let content = match fs::read_to_string(PROC_CPUINFO) {
        Ok(c) => c,
        Err(_) => return 0.0,
    };

    let freqs: Vec<f64> = content
        .lines()
        .filter(|line| line.starts_with("cpu MHz"))
        .filter_map(|line| line.split(':').nth(1))
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if freqs.is_empty() {
        return 0.0;
    }
    freqs.iter().sum::<f64>() / freqs.len() as f64
}
