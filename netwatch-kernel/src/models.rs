use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

/// A monitored device as read from `devices.yaml`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeviceDescriptor {
    pub name: String,
    #[serde(alias = "ip")]
    pub address: String,
    #[serde(default)]
    pub kind: DeviceKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricCheck>,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Reachability only.
    #[default]
    Ping,
    /// Reachability plus SNMP metric thresholds.
    Snmp,
}

/// One SNMP-read value compared against an upper limit (percent).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MetricCheck {
    pub name: String,
    pub oid: String,
    pub threshold: f64,
}

/// Where a device stands in its alert episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottlePhase {
    Up,
    DownPendingFirstAlert,
    DownAlerted,
}

/// Per-device bookkeeping, owned by the poll loop and never served as-is.
///
/// `first_down_at` is set for the whole down episode; `last_alert_at` only
/// once an alert actually went out during that episode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceRuntimeState {
    pub consecutive_failures: u32,
    pub first_down_at: Option<OffsetDateTime>,
    pub last_alert_at: Option<OffsetDateTime>,
}

impl DeviceRuntimeState {
    pub fn is_down(&self, unreachable_threshold: u32) -> bool {
        self.consecutive_failures >= unreachable_threshold
    }

    pub fn phase(&self) -> ThrottlePhase {
        match (self.first_down_at, self.last_alert_at) {
            (None, _) => ThrottlePhase::Up,
            (Some(_), None) => ThrottlePhase::DownPendingFirstAlert,
            (Some(_), Some(_)) => ThrottlePhase::DownAlerted,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    #[serde(rename = "OK")]
    Ok,
    Alert,
}

/// What the API serves for one device; replaced whole every cycle.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeviceStatusSnapshot {
    pub status: DeviceStatus,
    pub messages: Vec<String>,
    #[serde(rename = "ip")]
    pub address: String,
    pub reachable: bool,
}

/// Alerts that passed the throttle for one device in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub device: String,
    pub messages: Vec<String>,
}

pub type StatusMap = HashMap<String, DeviceStatusSnapshot>;
pub type RuntimeMap = HashMap<String, DeviceRuntimeState>;
