//! Gateway process CPU and memory sampling
//!
//! CPU is reported as the share of one core consumed between two consecutive
//! samples, so the very first sample has nothing to compare against and
//! reports zero.

use parking_lot::Mutex;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::time::Instant;
use tracing::debug;

/// Raw counters read from the operating system
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSnapshot {
    pub taken_at: Instant,
    /// CPU time consumed since process start
    pub cpu_time: Duration,
    pub resident_bytes: u64,
    pub total_memory_bytes: u64,
}

/// Source of process snapshots
pub trait ProcessProbe: Send + Sync {
    fn snapshot(&self) -> Option<ProcessSnapshot>;
}

/// Percentages derived from two snapshots
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessUsage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

/// Probe backed by `sysinfo`, scoped to the current process
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            debug!("Current process id unavailable; process metrics disabled");
        }
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SysinfoProbe {
    fn snapshot(&self) -> Option<ProcessSnapshot> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        system.refresh_memory();

        let process = system.process(pid)?;
        Some(ProcessSnapshot {
            taken_at: Instant::now(),
            cpu_time: Duration::from_millis(process.accumulated_cpu_time()),
            resident_bytes: process.memory(),
            total_memory_bytes: system.total_memory(),
        })
    }
}

/// Turns successive snapshots into usage percentages
pub struct ProcessSampler {
    probe: Box<dyn ProcessProbe>,
    baseline: Mutex<Option<ProcessSnapshot>>,
}

impl ProcessSampler {
    pub fn new(probe: Box<dyn ProcessProbe>) -> Self {
        Self {
            probe,
            baseline: Mutex::new(None),
        }
    }

    pub fn system() -> Self {
        Self::new(Box::new(SysinfoProbe::new()))
    }

    /// `None` when the probe cannot read the process
    pub fn sample(&self) -> Option<ProcessUsage> {
        let current = self.probe.snapshot()?;
        let previous = self.baseline.lock().replace(current);

        let cpu_percent = previous.map_or(0.0, |previous| cpu_percent(&previous, &current));
        let memory_percent = if current.total_memory_bytes == 0 {
            0.0
        } else {
            current.resident_bytes as f64 / current.total_memory_bytes as f64 * 100.0
        };

        Some(ProcessUsage {
            cpu_percent,
            memory_percent,
        })
    }
}

fn cpu_percent(previous: &ProcessSnapshot, current: &ProcessSnapshot) -> f64 {
    let wall = current.taken_at.saturating_duration_since(previous.taken_at);
    if wall.is_zero() {
        return 0.0;
    }
    let cpu = current.cpu_time.saturating_sub(previous.cpu_time);
    (cpu.as_secs_f64() / wall.as_secs_f64() * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedProbe {
        snapshots: Mutex<VecDeque<ProcessSnapshot>>,
    }

    impl ProcessProbe for ScriptedProbe {
        fn snapshot(&self) -> Option<ProcessSnapshot> {
            self.snapshots.lock().pop_front()
        }
    }

    fn sampler(snapshots: Vec<ProcessSnapshot>) -> ProcessSampler {
        ProcessSampler::new(Box::new(ScriptedProbe {
            snapshots: Mutex::new(snapshots.into()),
        }))
    }

    fn snapshot(at: Instant, cpu_ms: u64, resident: u64) -> ProcessSnapshot {
        ProcessSnapshot {
            taken_at: at,
            cpu_time: Duration::from_millis(cpu_ms),
            resident_bytes: resident,
            total_memory_bytes: 1000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_sample_reports_zero_cpu() {
        let start = Instant::now();
        let sampler = sampler(vec![snapshot(start, 5_000, 250)]);

        let usage = sampler.sample().unwrap();
        assert_eq!(usage.cpu_percent, 0.0);
        assert!((usage.memory_percent - 25.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cpu_is_delta_over_wall_time() {
        let start = Instant::now();
        let sampler = sampler(vec![
            snapshot(start, 1_000, 100),
            snapshot(start + Duration::from_secs(2), 1_500, 100),
        ]);

        sampler.sample().unwrap();
        let usage = sampler.sample().unwrap();
        assert!((usage.cpu_percent - 25.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cpu_is_clamped_and_zero_wall_is_safe() {
        let start = Instant::now();
        let sampler = sampler(vec![
            snapshot(start, 0, 100),
            snapshot(start + Duration::from_secs(1), 4_000, 100),
            snapshot(start + Duration::from_secs(1), 5_000, 100),
        ]);

        sampler.sample().unwrap();
        assert_eq!(sampler.sample().unwrap().cpu_percent, 100.0);
        assert_eq!(sampler.sample().unwrap().cpu_percent, 0.0);
    }

    #[tokio::test]
    async fn test_sysinfo_probe_reads_cumulative_cpu_time() {
        let probe = SysinfoProbe::new();
        let first = probe.snapshot().unwrap();

        let mut acc = 0u64;
        for i in 0..20_000_000u64 {
            acc = acc.wrapping_mul(31).wrapping_add(i);
        }
        std::hint::black_box(acc);

        let second = probe.snapshot().unwrap();
        assert!(second.cpu_time >= first.cpu_time);
        assert!(second.resident_bytes > 0);
        assert!(second.total_memory_bytes >= second.resident_bytes);
    }

    #[test]
    fn test_unreadable_process_yields_nothing() {
        assert!(sampler(Vec::new()).sample().is_none());
    }
}
