//! The immutable per-tick aggregate of all domain readings.

use crate::probes::{
    CpuReading, DiskReading, GpuReading, MemoryReading, NetworkReading, ProcessReading,
};
use serde::Serialize;
use std::time::Instant;

/// Per-domain staleness. A set flag means that domain's probe failed this
/// tick and the carried reading is from an earlier tick (or the zero
/// default). Observability only; not part of the exported value.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaleFlags {
    pub cpu: bool,
    pub gpu: bool,
    pub memory: bool,
    pub disks: bool,
    pub network: bool,
    pub processes: bool,
}

impl StaleFlags {
    /// Names of the domains whose reading carried over from an earlier tick.
    pub fn domains(&self) -> Vec<&'static str> {
        let flags = [
            ("cpu", self.cpu),
            ("gpu", self.gpu),
            ("memory", self.memory),
            ("disks", self.disks),
            ("network", self.network),
            ("processes", self.processes),
        ];
        flags
            .into_iter()
            .filter_map(|(name, stale)| stale.then_some(name))
            .collect()
    }
}

/// One assembled tick across all domains. Created fresh each tick and never
/// mutated afterwards; the serialized form is exactly the six wire keys.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    #[serde(skip)]
    pub timestamp: Instant,
    #[serde(skip)]
    pub stale: StaleFlags,
    pub cpu: CpuReading,
    pub gpu: GpuReading,
    pub memory: MemoryReading,
    pub disks: Vec<DiskReading>,
    pub network: NetworkReading,
    /// Top-N processes by descending CPU%, ties broken by ascending PID.
    pub processes: Vec<ProcessReading>,
}
