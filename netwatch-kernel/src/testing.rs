//! Test doubles for the kernel's seams: probe, notifier and registry.
//!
//! All of them record what they were asked so tests can assert on call
//! counts and payloads without a network or an SMTP server.

use crate::models::{DeviceDescriptor, DeviceKind, MetricCheck};
use crate::notifier::{Notifier, NotifyError};
use crate::registry::{NotificationUpdate, RegistryError, RegistrySource};
use async_trait::async_trait;
use netwatch_probes::Probe;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn ping_device(name: &str, address: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        name: name.into(),
        address: address.into(),
        kind: DeviceKind::Ping,
        metrics: vec![],
        notifications_enabled: true,
    }
}

pub fn snmp_device(name: &str, address: &str, checks: &[(&str, &str, f64)]) -> DeviceDescriptor {
    DeviceDescriptor {
        kind: DeviceKind::Snmp,
        metrics: checks
            .iter()
            .map(|(metric, oid, threshold)| MetricCheck {
                name: metric.to_string(),
                oid: oid.to_string(),
                threshold: *threshold,
            })
            .collect(),
        ..ping_device(name, address)
    }
}

/// Probe whose answers are set by the test. Unknown addresses answer "up".
#[derive(Default)]
pub struct ScriptedProbe {
    down: Mutex<HashMap<String, bool>>,
    metrics: Mutex<HashMap<(String, String), f64>>,
    ping_calls: Mutex<HashMap<String, usize>>,
    metric_calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, address: &str, up: bool) {
        self.down.lock().insert(address.to_string(), !up);
    }

    pub fn set_metric(&self, address: &str, oid: &str, value: f64) {
        self.metrics
            .lock()
            .insert((address.to_string(), oid.to_string()), value);
    }

    pub fn ping_calls(&self, address: &str) -> usize {
        self.ping_calls.lock().get(address).copied().unwrap_or(0)
    }

    pub fn metric_calls(&self) -> usize {
        self.metric_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn reachable(&self, address: &str) -> bool {
        *self.ping_calls.lock().entry(address.to_string()).or_default() += 1;
        !self.down.lock().get(address).copied().unwrap_or(false)
    }

    async fn query_metric(&self, address: &str, metric_id: &str) -> Option<f64> {
        self.metric_calls.fetch_add(1, Ordering::SeqCst);
        self.metrics
            .lock()
            .get(&(address.to_string(), metric_id.to_string()))
            .copied()
    }
}

/// Captures every message; can be switched to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Calls to `send`, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Build("scripted failure".into()));
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }
}

/// In-memory registry; `set_failing(true)` simulates an unreadable source.
#[derive(Default)]
pub struct StaticRegistry {
    devices: Mutex<Vec<DeviceDescriptor>>,
    failing: AtomicBool,
    loads: AtomicUsize,
}

impl StaticRegistry {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices: Mutex::new(devices),
            ..Self::default()
        }
    }

    pub fn set_devices(&self, devices: Vec<DeviceDescriptor>) {
        *self.devices.lock() = devices;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Calls to `load`, failed ones included.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistrySource for StaticRegistry {
    async fn load(&self) -> Result<Vec<DeviceDescriptor>, RegistryError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(scripted_failure());
        }
        Ok(self.devices.lock().clone())
    }

    async fn set_notifications(
        &self,
        updates: &BTreeMap<String, bool>,
    ) -> Result<NotificationUpdate, RegistryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(scripted_failure());
        }
        let mut devices = self.devices.lock();
        let mut outcome = NotificationUpdate::default();
        for (name, enabled) in updates {
            let mut found = false;
            for device in devices.iter_mut().filter(|d| &d.name == name) {
                device.notifications_enabled = *enabled;
                found = true;
            }
            if found {
                outcome.updated.push(name.clone());
            } else {
                outcome.unknown.push(name.clone());
            }
        }
        Ok(outcome)
    }
}

fn scripted_failure() -> RegistryError {
    RegistryError::Io {
        path: PathBuf::from("memory://devices"),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted failure"),
    }
}
