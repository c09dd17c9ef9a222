/**
 * POLL LOOP - One evaluation pass over the registry per interval
 *
 * Each cycle:
 * 1. re-read the registry (failure: log, back off, try again)
 * 2. per device, in registry order: evaluate, throttle, write its snapshot;
 *    a bad device is logged and skipped, never fatal to the cycle
 * 3. if anything fired, one combined message, one notifier call
 * 4. sleep, unless shutdown was requested
 *
 * The poller owns every `DeviceRuntimeState`; the HTTP side only ever sees
 * the `StatusStore`.
 */

use crate::config::Settings;
use crate::evaluator::{EvaluationError, HealthEvaluator};
use crate::health::HealthTracker;
use crate::models::{AlertEvent, DeviceDescriptor, DeviceStatus, DeviceStatusSnapshot, RuntimeMap};
use crate::notifier::Notifier;
use crate::registry::RegistrySource;
use crate::store::StatusStore;
use crate::throttle::AlertThrottle;
use netwatch_probes::Probe;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub evaluated: usize,
    pub failed: Vec<String>,
    pub fired: Vec<AlertEvent>,
    pub notified: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    RegistryUnavailable,
}

pub struct Poller {
    probe: Arc<dyn Probe>,
    registry: Arc<dyn RegistrySource>,
    notifier: Arc<dyn Notifier>,
    store: StatusStore,
    health: HealthTracker,
    evaluator: HealthEvaluator,
    throttle: AlertThrottle,
    runtime: RuntimeMap,
    poll_interval: Duration,
    registry_backoff: Duration,
}

impl Poller {
    pub fn new(
        settings: &Settings,
        probe: Arc<dyn Probe>,
        registry: Arc<dyn RegistrySource>,
        notifier: Arc<dyn Notifier>,
        store: StatusStore,
        health: HealthTracker,
    ) -> Self {
        Self {
            probe,
            registry,
            notifier,
            store,
            health,
            evaluator: HealthEvaluator::new(settings.unreachable_threshold),
            throttle: AlertThrottle::new(settings.initial_delay, settings.alert_cooldown),
            runtime: RuntimeMap::new(),
            poll_interval: settings.poll_interval,
            registry_backoff: settings.registry_backoff,
        }
    }

    /// Runs cycles until `shutdown` flips to true (or its sender goes away).
    /// A cycle in progress always completes; only the sleep is interrupted.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval = ?self.poll_interval,
            threshold = self.evaluator.unreachable_threshold(),
            initial_delay = %self.throttle.initial_delay(),
            cooldown = %self.throttle.cooldown(),
            "poll loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.run_cycle(OffsetDateTime::now_utc()).await {
                CycleOutcome::Completed(report) => {
                    tracing::debug!(
                        evaluated = report.evaluated,
                        failed = report.failed.len(),
                        fired = report.fired.len(),
                        "cycle complete"
                    );
                    self.poll_interval
                }
                CycleOutcome::RegistryUnavailable => self.registry_backoff,
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("poll loop stopped");
    }

    pub async fn run_cycle(&mut self, now: OffsetDateTime) -> CycleOutcome {
        let devices = match self.registry.load().await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::error!(error = %e, backoff = ?self.registry_backoff, "cannot load device registry, skipping cycle");
                self.health.mark_registry_failure();
                return CycleOutcome::RegistryUnavailable;
            }
        };

        let mut report = CycleReport::default();
        let mut seen: HashSet<String> = HashSet::with_capacity(devices.len());

        for device in &devices {
            match self.poll_device(device, &mut seen, now).await {
                Ok(fired) => {
                    report.evaluated += 1;
                    report.fired.extend(fired);
                }
                Err(e) => {
                    tracing::warn!(device = %device.name, error = %e, "device skipped this cycle");
                    report.failed.push(device.name.clone());
                }
            }
        }

        self.forget_missing(&seen);

        if !report.fired.is_empty() {
            let text = compose_alert_message(&report.fired, self.throttle.cooldown(), now);
            match self.notifier.send(&text).await {
                Ok(()) => report.notified = true,
                Err(e) => {
                    tracing::error!(error = %e, devices = report.fired.len(), "failed to send alert notification");
                    self.health.mark_notifier_failure();
                }
            }
        }

        self.health.mark_cycle(now, devices.len());
        CycleOutcome::Completed(report)
    }

    /// Sends the one-off "monitor started" message.
    pub async fn announce_startup(&self, now: OffsetDateTime) {
        let text = format!(
            "Network Monitor System has started\n\nTime: {}",
            format_timestamp(now)
        );
        if let Err(e) = self.notifier.send(&text).await {
            tracing::error!(error = %e, "failed to send startup notification");
            self.health.mark_notifier_failure();
        }
    }

    #[cfg(test)]
    pub fn runtime_state(&self, device: &str) -> Option<&crate::models::DeviceRuntimeState> {
        self.runtime.get(device)
    }

    async fn poll_device(
        &mut self,
        device: &DeviceDescriptor,
        seen: &mut HashSet<String>,
        now: OffsetDateTime,
    ) -> Result<Option<AlertEvent>, EvaluationError> {
        if !seen.insert(device.name.clone()) {
            return Err(EvaluationError::DuplicateName(device.name.clone()));
        }

        let state = self.runtime.entry(device.name.clone()).or_default();
        let eval = self.evaluator.evaluate(self.probe.as_ref(), device, state).await?;
        let fire = self.throttle.should_fire(device, state, eval.down, now);

        self.store.write(
            &device.name,
            DeviceStatusSnapshot {
                status: if eval.alerts.is_empty() {
                    DeviceStatus::Ok
                } else {
                    DeviceStatus::Alert
                },
                messages: eval.alerts.clone(),
                address: device.address.clone(),
                reachable: eval.reachable_now,
            },
        );

        Ok(fire.then(|| AlertEvent {
            device: device.name.clone(),
            messages: eval.alerts,
        }))
    }

    fn forget_missing(&mut self, seen: &HashSet<String>) {
        self.runtime.retain(|name, _| seen.contains(name));
        let keep: HashSet<&str> = seen.iter().map(String::as_str).collect();
        let removed = self.store.retain(&keep);
        if removed > 0 {
            tracing::info!(removed, "dropped devices no longer in the registry");
        }
    }
}

/// One message for the whole cycle: a bullet per device plus a note on
/// when the next reminder goes out.
pub fn compose_alert_message(events: &[AlertEvent], cooldown: time::Duration, now: OffsetDateTime) -> String {
    let mut text = format!("Network alerts at {}:\n\n", format_timestamp(now));
    for event in events {
        text.push_str("- ");
        text.push_str(&event.messages.join("; "));
        text.push('\n');
    }

    let cooldown_std = Duration::try_from(cooldown).unwrap_or_default();
    text.push_str(&format!(
        "\nIf these issues persist, the next alert will be sent in {}",
        humantime::format_duration(cooldown_std)
    ));
    // a cooldown past the calendar's end has no wall-clock time to show
    match now.checked_add(cooldown) {
        Some(next) => text.push_str(&format!(" (around {}).", format_timestamp(next))),
        None => text.push('.'),
    }
    text
}

fn format_timestamp(t: OffsetDateTime) -> String {
    t.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC"))
        .unwrap_or_else(|_| t.to_string())
}
