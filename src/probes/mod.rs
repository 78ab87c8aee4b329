//! Per-domain sampling probes over Linux procfs/sysfs.

pub mod cpu;
pub mod disk;
pub mod gpu;
pub mod memory;
pub mod network;
pub mod process;

use crate::error::{InitError, SampleError};
use std::time::Instant;

pub use cpu::CpuReading;
pub use disk::DiskReading;
pub use gpu::GpuReading;
pub use memory::MemoryReading;
pub use network::NetworkReading;
pub use process::ProcessReading;

/// Uniform capability implemented once per hardware domain.
///
/// `initialize` verifies the probe's hard dependencies and primes any
/// baselines; a failure there is fatal to startup. `sample` reads the domain
/// once; a failure there is recovered by the orchestrator, which keeps the
/// previous reading for the tick.
pub trait Probe {
    type Reading: Clone + Default;

    const DOMAIN: &'static str;

    fn initialize(&mut self) -> Result<(), InitError>;

    fn sample(&mut self, now: Instant) -> Result<Self::Reading, SampleError>;
}
