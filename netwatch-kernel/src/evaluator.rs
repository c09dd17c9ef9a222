/**
 * HEALTH EVALUATOR - Turns one raw probe per cycle into a debounced verdict
 *
 * - One reachability probe per device per cycle
 * - Failure bumps `consecutive_failures`, success resets it to 0
 * - Down only once `consecutive_failures >= unreachable_threshold`, so a
 *   single lost echo never counts as an outage
 * - SNMP metric checks run only while the device is confirmed down
 *
 * Episode timestamps (`first_down_at`, `last_alert_at`) belong to the
 * alert throttle and are left untouched here.
 */

use crate::models::{DeviceDescriptor, DeviceKind, DeviceRuntimeState};
use netwatch_probes::Probe;

/// Per-device configuration problems; the device is skipped for the cycle.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("device {0} has no address")]
    MissingAddress(String),
    #[error("snmp device {0} has no metric checks")]
    NoMetricChecks(String),
    #[error("device name {0:?} appears more than once in the registry")]
    DuplicateName(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub alerts: Vec<String>,
    pub reachable_now: bool,
    pub down: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct HealthEvaluator {
    unreachable_threshold: u32,
}

impl HealthEvaluator {
    pub fn new(unreachable_threshold: u32) -> Self {
        Self {
            unreachable_threshold: unreachable_threshold.max(1),
        }
    }

    pub fn unreachable_threshold(&self) -> u32 {
        self.unreachable_threshold
    }

    pub async fn evaluate(
        &self,
        probe: &dyn Probe,
        device: &DeviceDescriptor,
        state: &mut DeviceRuntimeState,
    ) -> Result<Evaluation, EvaluationError> {
        validate(device)?;

        let reachable_now = probe.reachable(&device.address).await;
        if reachable_now {
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            tracing::debug!(
                device = %device.name,
                failures = state.consecutive_failures,
                threshold = self.unreachable_threshold,
                "reachability check failed"
            );
        }

        let down = state.is_down(self.unreachable_threshold);
        if !down {
            return Ok(Evaluation {
                alerts: Vec::new(),
                reachable_now,
                down,
            });
        }

        let mut alerts = vec![format!(
            "Device {} ({}) is unreachable",
            device.name, device.address
        )];

        if device.kind == DeviceKind::Snmp {
            for check in &device.metrics {
                match probe.query_metric(&device.address, &check.oid).await {
                    Some(value) if value > check.threshold => alerts.push(format!(
                        "{} at {} exceeds threshold {}",
                        check.name, value, check.threshold
                    )),
                    Some(_) => {}
                    None => tracing::debug!(device = %device.name, metric = %check.name, "metric unavailable"),
                }
            }
        }

        Ok(Evaluation {
            alerts,
            reachable_now,
            down,
        })
    }
}

fn validate(device: &DeviceDescriptor) -> Result<(), EvaluationError> {
    if device.address.trim().is_empty() {
        return Err(EvaluationError::MissingAddress(device.name.clone()));
    }
    if device.kind == DeviceKind::Snmp && device.metrics.is_empty() {
        return Err(EvaluationError::NoMetricChecks(device.name.clone()));
    }
    Ok(())
}
