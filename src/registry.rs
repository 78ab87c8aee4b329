//! Per-process differential CPU-time tracking across sampling ticks.
//!
//! Cumulative CPU time cannot shrink for the same process, so a shrink is the
//! signature of PID reuse and the stale baseline must be discarded. Entries
//! for PIDs no longer observed are purged every tick, which caps the map to
//! the live process count and keeps a reused PID from inheriting a baseline
//! it was never associated with.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Raw, stateless data read for one process in one tick.
#[derive(Debug, Clone)]
pub struct ProcessObservation {
    pub pid: u32,
    pub name: String,
    /// Cumulative CPU time (user + system) in clock ticks.
    pub cpu_time_ticks: u64,
    pub memory_bytes: u64,
}

/// Which time base per-process CPU% is normalized against.
///
/// The platform reports cumulative time across all cores; a busy
/// multi-threaded process can therefore exceed 100% on the single-core basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuBasis {
    /// 100% = one logical core fully used (the compatible default).
    SingleCore,
    /// 100% = all logical cores fully used.
    AllCores(usize),
}

impl CpuBasis {
    fn divisor(self) -> f64 {
        match self {
            CpuBasis::SingleCore => 1.0,
            CpuBasis::AllCores(n) => n.max(1) as f64,
        }
    }
}

#[derive(Debug)]
struct Entry {
    cpu_time_ticks: u64,
    last_seen: Instant,
    cpu_percent: f64,
}

/// Differential CPU% tracker keyed by PID.
#[derive(Debug)]
pub struct ProcessRegistry {
    entries: HashMap<u32, Entry>,
    ticks_per_sec: f64,
    basis: CpuBasis,
}

impl ProcessRegistry {
    pub fn new(ticks_per_sec: u64, basis: CpuBasis) -> Self {
        Self {
            entries: HashMap::new(),
            ticks_per_sec: ticks_per_sec.max(1) as f64,
            basis,
        }
    }

    /// Fold one tick's observations into the registry and report CPU% per PID.
    ///
    /// First sightings (including PID reuse detected by a shrunk cumulative
    /// time) report 0% while their baseline is established. A zero-width
    /// interval reports the previous CPU% without updating stored state.
    pub fn update(
        &mut self,
        observations: &[ProcessObservation],
        now: Instant,
    ) -> HashMap<u32, f64> {
        let mut percents = HashMap::with_capacity(observations.len());
        let mut seen = HashSet::with_capacity(observations.len());

        for obs in observations {
            seen.insert(obs.pid);
            let percent = match self.entries.entry(obs.pid) {
                MapEntry::Vacant(slot) => {
                    slot.insert(Entry {
                        cpu_time_ticks: obs.cpu_time_ticks,
                        last_seen: now,
                        cpu_percent: 0.0,
                    });
                    0.0
                }
                MapEntry::Occupied(mut slot) => {
                    let entry = slot.get_mut();
                    if obs.cpu_time_ticks < entry.cpu_time_ticks {
                        // PID reused by a newer process: fresh baseline.
                        entry.cpu_time_ticks = obs.cpu_time_ticks;
                        entry.last_seen = now;
                        entry.cpu_percent = 0.0;
                        0.0
                    } else {
                        let dt = now.saturating_duration_since(entry.last_seen).as_secs_f64();
                        if dt <= 0.0 {
                            entry.cpu_percent
                        } else {
                            let delta = obs.cpu_time_ticks - entry.cpu_time_ticks;
                            let cpu_seconds = delta as f64 / self.ticks_per_sec;
                            let percent = cpu_seconds / dt * 100.0 / self.basis.divisor();
                            entry.cpu_time_ticks = obs.cpu_time_ticks;
                            entry.last_seen = now;
                            entry.cpu_percent = percent;
                            percent
                        }
                    }
                }
            };
            percents.insert(obs.pid, percent);
        }

        // Purge everything not observed this tick.
        self.entries.retain(|pid, _| seen.contains(pid));

        percents
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn obs(pid: u32, ticks: u64) -> ProcessObservation {
        ProcessObservation {
            pid,
            name: format!("proc-{pid}"),
            cpu_time_ticks: ticks,
            memory_bytes: 0,
        }
    }

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    #[test]
    fn first_sighting_reports_zero() {
        let base = Instant::now();
        let mut registry = ProcessRegistry::new(100, CpuBasis::SingleCore);
        let percents = registry.update(&[obs(100, 1000)], base);
        assert_eq!(percents[&100], 0.0);
    }

    #[test]
    fn measured_interval_reports_tick_delta() {
        let base = Instant::now();
        let mut registry = ProcessRegistry::new(100, CpuBasis::SingleCore);
        registry.update(&[obs(100, 1000)], base);

        // 500 ticks at 100 ticks/s is 5 CPU-seconds inside 1s of wall time.
        let percents = registry.update(&[obs(100, 1500)], at(base, 1));
        assert_eq!(percents[&100], 500.0);
    }

    #[test]
    fn all_cores_basis_divides_by_core_count() {
        let base = Instant::now();
        let mut registry = ProcessRegistry::new(100, CpuBasis::AllCores(4));
        registry.update(&[obs(7, 0)], base);
        let percents = registry.update(&[obs(7, 100)], at(base, 1));
        // One full core out of four.
        assert_eq!(percents[&7], 25.0);
    }

    #[test]
    fn absent_pid_is_purged_and_reuse_starts_fresh() {
        let base = Instant::now();
        let mut registry = ProcessRegistry::new(100, CpuBasis::SingleCore);
        registry.update(&[obs(100, 1000)], base);
        registry.update(&[obs(100, 1500)], at(base, 1));

        // pid 100 gone at t=2.
        registry.update(&[obs(200, 10)], at(base, 2));
        assert_eq!(registry.tracked(), 1);

        // pid 100 back at t=3 with a smaller cumulative time than the purged
        // baseline: a different process, 0% at this sighting.
        let percents = registry.update(&[obs(100, 50), obs(200, 20)], at(base, 3));
        assert_eq!(percents[&100], 0.0);
    }

    #[test]
    fn shrunk_cumulative_time_rebaselines_live_entry() {
        let base = Instant::now();
        let mut registry = ProcessRegistry::new(100, CpuBasis::SingleCore);
        registry.update(&[obs(42, 900)], base);
        registry.update(&[obs(42, 1000)], at(base, 1));

        // Reused PID between ticks: cumulative time fell.
        let percents = registry.update(&[obs(42, 10)], at(base, 2));
        assert_eq!(percents[&42], 0.0);

        // Measurement resumes against the new baseline.
        let percents = registry.update(&[obs(42, 110)], at(base, 3));
        assert_eq!(percents[&42], 100.0);
    }

    #[test]
    fn zero_width_interval_keeps_previous_percent() {
        let base = Instant::now();
        let mut registry = ProcessRegistry::new(100, CpuBasis::SingleCore);
        registry.update(&[obs(5, 0)], base);
        let percents = registry.update(&[obs(5, 100)], at(base, 1));
        assert_eq!(percents[&5], 100.0);

        // Clock did not advance: previous percent, no state update.
        let percents = registry.update(&[obs(5, 100_000)], at(base, 1));
        assert_eq!(percents[&5], 100.0);
        let percents = registry.update(&[obs(5, 200)], at(base, 2));
        assert_eq!(percents[&5], 100.0);
    }
}
