//! Physical memory readings from /proc/meminfo.

use crate::error::{InitError, SampleError};
use crate::export::round2;
use crate::probes::Probe;
use serde::Serialize;
use std::fs;
use std::time::Instant;

const PROC_MEMINFO: &str = "/proc/meminfo";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize, Default)]
pub struct MemoryReading {
    /// Total physical memory in MB.
    #[serde(serialize_with = "round2")]
    pub total: f64,
    /// Used memory in MB (total minus available).
    #[serde(serialize_with = "round2")]
    pub used: f64,
    /// Available memory in MB.
    #[serde(serialize_with = "round2")]
    pub free: f64,
    #[serde(rename = "usagePercent", serialize_with = "round2")]
    pub usage_percent: f64,
}

/// Stateless memory probe; every tick is a fresh /proc/meminfo read.
#[derive(Debug, Default)]
pub struct MemoryProbe;

impl MemoryProbe {
    pub fn new() -> Self {
        Self
    }
}

impl Probe for MemoryProbe {
    type Reading = MemoryReading;

    const DOMAIN: &'static str = "memory";

    fn initialize(&mut self) -> Result<(), InitError> {
        fs::read_to_string(PROC_MEMINFO)
            .map_err(|e| InitError::new(Self::DOMAIN, SampleError::read(PROC_MEMINFO, e)))?;
        Ok(())
    }

    fn sample(&mut self, _now: Instant) -> Result<MemoryReading, SampleError> {
        let content = fs::read_to_string(PROC_MEMINFO)
            .map_err(|e| SampleError::read(PROC_MEMINFO, e))?;
        parse_meminfo(&content).ok_or_else(|| SampleError::parse(PROC_MEMINFO))
    }
}

fn parse_meminfo(content: &str) -> Option<MemoryReading> {
    let mut total_kb: Option<u64> = None;
    let mut available_kb: Option<u64> = None;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("MemTotal:") => total_kb = parts.next().and_then(|s| s.parse().ok()),
            Some("MemAvailable:") => available_kb = parts.next().and_then(|s| s.parse().ok()),
            _ => {}
        }
    }

    let total_bytes = total_kb? * 1024;
    let available_bytes = available_kb.unwrap_or(0) * 1024;
    let used_bytes = total_bytes.saturating_sub(available_bytes);

    let usage_percent = if total_bytes > 0 {
        100.0 * used_bytes as f64 / total_bytes as f64
    } else {
        0.0
    };

    Some(MemoryReading {
        total: total_bytes as f64 / BYTES_PER_MB,
        used: used_bytes as f64 / BYTES_PER_MB,
        free: available_bytes as f64 / BYTES_PER_MB,
        usage_percent,
    })
}
