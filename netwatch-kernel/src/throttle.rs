/**
 * ALERT THROTTLE - Decides whether a down device gets a notification now
 *
 * Per-device phases (derived from `DeviceRuntimeState`):
 *
 *   Up --down--> DownPendingFirstAlert --initial_delay elapsed--> DownAlerted
 *                        |                                         |  ^
 *                        +---------------- up ---------------------+  | cooldown elapsed
 *                                          |                       +--+
 *                                          v
 *                                          Up (timestamps cleared)
 *
 * Muted devices (`notifications_enabled: false`) walk the same phases but
 * never fire; their episode clock keeps running.
 */

use crate::models::{DeviceDescriptor, DeviceRuntimeState, ThrottlePhase};
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy)]
pub struct AlertThrottle {
    initial_delay: Duration,
    cooldown: Duration,
}

impl AlertThrottle {
    pub fn new(initial_delay: std::time::Duration, cooldown: std::time::Duration) -> Self {
        Self {
            initial_delay: to_time(initial_delay),
            cooldown: to_time(cooldown),
        }
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Up -> DownPendingFirstAlert.
    pub fn on_transition_down(&self, state: &mut DeviceRuntimeState, now: OffsetDateTime) {
        state.first_down_at = Some(now);
        state.last_alert_at = None;
    }

    /// Any Down* -> Up. The next outage starts a fresh episode.
    pub fn on_transition_up(&self, state: &mut DeviceRuntimeState) {
        state.first_down_at = None;
        state.last_alert_at = None;
    }

    /// Applies the transition implied by `is_down`, then returns whether an
    /// alert for `device` goes out at `now`. Firing records `last_alert_at`.
    pub fn should_fire(
        &self,
        device: &DeviceDescriptor,
        state: &mut DeviceRuntimeState,
        is_down: bool,
        now: OffsetDateTime,
    ) -> bool {
        if !is_down {
            if state.phase() != ThrottlePhase::Up {
                tracing::info!(device = %device.name, "device recovered");
                self.on_transition_up(state);
            }
            return false;
        }

        if state.phase() == ThrottlePhase::Up {
            tracing::warn!(device = %device.name, address = %device.address, "device down");
            self.on_transition_down(state, now);
        }

        if !device.notifications_enabled {
            return false;
        }

        let due = match (state.first_down_at, state.last_alert_at) {
            (Some(first), None) => now - first >= self.initial_delay,
            (Some(_), Some(last)) => now - last >= self.cooldown,
            (None, _) => false,
        };
        if due {
            state.last_alert_at = Some(now);
        }
        due
    }
}

fn to_time(d: std::time::Duration) -> Duration {
    Duration::try_from(d).unwrap_or(Duration::MAX)
}
