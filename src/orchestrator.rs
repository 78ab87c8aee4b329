//! Drives all probes once per tick and assembles the snapshot.

use crate::error::InitError;
use crate::probes::{
    cpu::CpuProbe, disk::DiskProbe, gpu::GpuProbe, memory::MemoryProbe, network::NetworkProbe,
    process::ProcessProbe, CpuReading, DiskReading, GpuReading, MemoryReading, NetworkReading,
    Probe, ProcessReading,
};
use crate::registry::CpuBasis;
use crate::snapshot::{Snapshot, StaleFlags};
use std::cmp::Ordering;
use std::time::Instant;

pub const DEFAULT_TOP_PROCESSES: usize = 10;

/// Latest reading for one domain plus whether it went stale this tick.
#[derive(Debug, Default)]
struct DomainState<R> {
    latest: R,
    stale: bool,
}

/// Sample one probe, isolating failure: on error the previous reading is
/// kept for this tick and the domain is flagged stale.
fn refresh<P: Probe>(probe: &mut P, state: &mut DomainState<P::Reading>, now: Instant) {
    match probe.sample(now) {
        Ok(reading) => {
            state.latest = reading;
            state.stale = false;
        }
        Err(e) => {
            state.stale = true;
            eprintln!("{} probe sample failed: {:#}", P::DOMAIN, anyhow::Error::new(e));
        }
    }
}

/// Orchestrates the six domain probes over a shared tick.
///
/// Lifecycle is `new -> initialize -> tick*`. `tick` before a successful
/// `initialize` assembles only zero-valued defaults, all flagged stale.
pub struct SnapshotOrchestrator {
    cpu: CpuProbe,
    gpu: GpuProbe,
    memory: MemoryProbe,
    disk: DiskProbe,
    network: NetworkProbe,
    process: ProcessProbe,

    cpu_state: DomainState<CpuReading>,
    gpu_state: DomainState<GpuReading>,
    memory_state: DomainState<MemoryReading>,
    disk_state: DomainState<Vec<DiskReading>>,
    network_state: DomainState<NetworkReading>,
    process_state: DomainState<Vec<ProcessReading>>,

    top_n: usize,
    initialized: bool,
}

impl SnapshotOrchestrator {
    pub fn new(top_n: usize, basis: CpuBasis) -> Self {
        Self {
            cpu: CpuProbe::new(),
            gpu: GpuProbe::new(),
            memory: MemoryProbe::new(),
            disk: DiskProbe::new(),
            network: NetworkProbe::new(),
            process: ProcessProbe::new(basis),
            cpu_state: DomainState::default(),
            gpu_state: DomainState::default(),
            memory_state: DomainState::default(),
            disk_state: DomainState::default(),
            network_state: DomainState::default(),
            process_state: DomainState::default(),
            top_n,
            initialized: false,
        }
    }

    /// Initialize every probe in the fixed sampling order. The first failure
    /// aborts: there is no partially initialized orchestrator.
    pub fn initialize(&mut self) -> Result<(), InitError> {
        self.cpu.initialize()?;
        self.gpu.initialize()?;
        self.memory.initialize()?;
        self.disk.initialize()?;
        self.network.initialize()?;
        self.process.initialize()?;
        self.initialized = true;
        Ok(())
    }

    /// Run one sampling cycle and assemble the snapshot.
    ///
    /// A single failing probe never aborts the tick; its domain carries the
    /// previous reading and is flagged stale. `now` must be monotonically
    /// non-decreasing across calls; intervals may vary freely.
    pub fn tick(&mut self, now: Instant) -> Snapshot {
        if self.initialized {
            refresh(&mut self.cpu, &mut self.cpu_state, now);
            refresh(&mut self.gpu, &mut self.gpu_state, now);
            refresh(&mut self.memory, &mut self.memory_state, now);
            refresh(&mut self.disk, &mut self.disk_state, now);
            refresh(&mut self.network, &mut self.network_state, now);
            refresh(&mut self.process, &mut self.process_state, now);
        }

        Snapshot {
            timestamp: now,
            stale: StaleFlags {
                cpu: !self.initialized || self.cpu_state.stale,
                gpu: !self.initialized || self.gpu_state.stale,
                memory: !self.initialized || self.memory_state.stale,
                disks: !self.initialized || self.disk_state.stale,
                network: !self.initialized || self.network_state.stale,
                processes: !self.initialized || self.process_state.stale,
            },
            cpu: self.cpu_state.latest.clone(),
            gpu: self.gpu_state.latest.clone(),
            memory: self.memory_state.latest.clone(),
            disks: self.disk_state.latest.clone(),
            network: self.network_state.latest.clone(),
            processes: rank_top_processes(self.process_state.latest.clone(), self.top_n),
        }
    }
}

/// Sort by descending CPU%, ties broken by ascending PID, and truncate.
fn rank_top_processes(mut processes: Vec<ProcessReading>, top_n: usize) -> Vec<ProcessReading> {
    processes.sort_by(|a, b| {
        b.cpu_usage
            .partial_cmp(&a.cpu_usage)
            .unwrap_or(Ordering::Equal)
            .then(a.pid.cmp(&b.pid))
    });
    processes.truncate(top_n);
    processes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SampleError;

    /// Scripted probe: yields an increasing counter, failing on demand.
    #[derive(Default)]
    struct StubProbe {
        fail_next: bool,
        samples: u64,
    }

    impl Probe for StubProbe {
        type Reading = u64;

        const DOMAIN: &'static str = "stub";

        fn initialize(&mut self) -> Result<(), InitError> {
            Ok(())
        }

        fn sample(&mut self, _now: Instant) -> Result<u64, SampleError> {
            if self.fail_next {
                return Err(SampleError::parse("/stub"));
            }
            self.samples += 1;
            Ok(self.samples)
        }
    }

    fn reading(pid: u32, cpu_usage: f64) -> ProcessReading {
        ProcessReading {
            name: format!("p{pid}"),
            pid,
            cpu_usage,
            memory_usage: 0.0,
        }
    }

    #[test]
    fn failed_sample_keeps_previous_reading_and_flags_stale() {
        let mut probe = StubProbe::default();
        let mut state = DomainState::<u64>::default();

        refresh(&mut probe, &mut state, Instant::now());
        assert_eq!(state.latest, 1);
        assert!(!state.stale);

        probe.fail_next = true;
        refresh(&mut probe, &mut state, Instant::now());
        assert_eq!(state.latest, 1);
        assert!(state.stale);

        probe.fail_next = false;
        refresh(&mut probe, &mut state, Instant::now());
        assert_eq!(state.latest, 2);
        assert!(!state.stale);
    }

    #[test]
    fn failure_before_any_success_keeps_zero_default() {
        let mut probe = StubProbe {
            fail_next: true,
            samples: 0,
        };
        let mut state = DomainState::<u64>::default();
        refresh(&mut probe, &mut state, Instant::now());
        assert_eq!(state.latest, 0);
        assert!(state.stale);
    }

    #[test]
    fn ranking_orders_by_cpu_then_pid() {
        let ranked = rank_top_processes(
            vec![
                reading(1, 10.0),
                reading(2, 30.0),
                reading(3, 30.0),
                reading(4, 5.0),
            ],
            2,
        );
        let order: Vec<(u32, f64)> = ranked.iter().map(|p| (p.pid, p.cpu_usage)).collect();
        assert_eq!(order, [(2, 30.0), (3, 30.0)]);
    }

    #[test]
    fn ranking_truncates_to_requested_count() {
        let processes: Vec<ProcessReading> =
            (0..50).map(|pid| reading(pid, pid as f64)).collect();
        let ranked = rank_top_processes(processes, DEFAULT_TOP_PROCESSES);
        assert_eq!(ranked.len(), DEFAULT_TOP_PROCESSES);
        assert_eq!(ranked[0].pid, 49);
    }

    #[test]
    fn ranking_of_fewer_than_n_keeps_all() {
        let ranked = rank_top_processes(vec![reading(9, 1.0)], 10);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn tick_before_initialize_is_all_stale_defaults() {
        let mut orchestrator = SnapshotOrchestrator::new(10, CpuBasis::SingleCore);
        let snapshot = orchestrator.tick(Instant::now());
        assert!(snapshot.stale.cpu && snapshot.stale.processes);
        assert!(snapshot.stale.gpu && snapshot.stale.memory);
        assert!(snapshot.stale.disks && snapshot.stale.network);
        assert_eq!(snapshot.cpu.usage, 0.0);
        assert!(snapshot.disks.is_empty());
        assert!(snapshot.processes.is_empty());
        assert_eq!(snapshot.gpu.name, "Unknown");
    }
}
