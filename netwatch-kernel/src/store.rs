use crate::models::{DeviceStatusSnapshot, StatusMap};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Last-known status per device.
///
/// Written only by the poll loop, read by HTTP handlers. Each snapshot is
/// swapped in whole under the lock, so a reader sees either the previous
/// cycle's snapshot or the new one, never a mix.
#[derive(Clone)]
pub struct StatusStore {
    inner: Shared<StatusMap>,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self {
            inner: new_state(StatusMap::new()),
        }
    }
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, device: &str, snapshot: DeviceStatusSnapshot) {
        self.inner.lock().insert(device.to_string(), snapshot);
    }

    pub fn read_all(&self) -> StatusMap {
        self.inner.lock().clone()
    }

    #[cfg(test)]
    pub fn get(&self, device: &str) -> Option<DeviceStatusSnapshot> {
        self.inner.lock().get(device).cloned()
    }

    /// Drop devices that disappeared from the registry. Returns how many went.
    pub fn retain(&self, devices: &HashSet<&str>) -> usize {
        let mut map = self.inner.lock();
        let before = map.len();
        map.retain(|name, _| devices.contains(name.as_str()));
        before - map.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
