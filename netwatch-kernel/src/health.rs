use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Served by `GET /system/health`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub devices_tracked: u32,
    pub cycles_completed: u64,
    pub last_cycle_at: Option<String>,
    pub registry_failures: u32,
    pub notifier_failures: u32,
    pub memory_usage_mb: f32,
}

/// Counters the poll loop bumps and the API reads; cheap to clone.
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    cycles: Arc<AtomicU64>,
    devices: Arc<AtomicU32>,
    registry_failures: Arc<AtomicU32>,
    notifier_failures: Arc<AtomicU32>,
    last_cycle_at: Arc<parking_lot::Mutex<Option<OffsetDateTime>>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            cycles: Arc::new(AtomicU64::new(0)),
            devices: Arc::new(AtomicU32::new(0)),
            registry_failures: Arc::new(AtomicU32::new(0)),
            notifier_failures: Arc::new(AtomicU32::new(0)),
            last_cycle_at: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    pub fn mark_cycle(&self, at: OffsetDateTime, devices: usize) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.devices
            .store(u32::try_from(devices).unwrap_or(u32::MAX), Ordering::Relaxed);
        *self.last_cycle_at.lock() = Some(at);
    }

    pub fn mark_registry_failure(&self) {
        self.registry_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_notifier_failure(&self) {
        self.notifier_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self) -> KernelHealth {
        let last = *self.last_cycle_at.lock();
        let last_cycle_at = last.and_then(|t| t.format(&Rfc3339).ok());

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            devices_tracked: self.devices.load(Ordering::Relaxed),
            cycles_completed: self.cycles.load(Ordering::Relaxed),
            last_cycle_at,
            registry_failures: self.registry_failures.load(Ordering::Relaxed),
            notifier_failures: self.notifier_failures.load(Ordering::Relaxed),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

/// Resident set size from /proc on Linux, 0 elsewhere.
fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }
    0.0
}
