/**
 * DEVICE REGISTRY - List of monitored devices, re-read every cycle
 *
 * The registry is a YAML file with a top-level `devices:` list:
 *
 * ```yaml
 * devices:
 *   - name: core-switch
 *     ip: 10.0.0.2
 *     kind: snmp
 *     metrics:
 *       - { name: cpu, oid: 1.3.6.1.4.1.9.2.1.58.0, threshold: 85 }
 *   - name: nas
 *     ip: 10.0.0.20
 *     notifications_enabled: false
 * ```
 *
 * No caching: the poll loop calls `load()` each cycle so edits apply on the
 * next pass. The settings API writes `notifications_enabled` back through
 * `set_notifications()`: the flag is edited on the raw YAML tree, so key
 * names (`ip`), unmodelled keys and omitted defaults stay as written, then
 * the file is replaced via temp file + rename. Comments do not survive.
 */

use crate::models::DeviceDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid device list in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Result of a settings write-back.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct NotificationUpdate {
    pub updated: Vec<String>,
    pub unknown: Vec<String>,
}

#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Current device list, in file order.
    async fn load(&self) -> Result<Vec<DeviceDescriptor>, RegistryError>;

    /// Persist per-device `notifications_enabled` flags. Names not in the
    /// registry are reported back, not created.
    async fn set_notifications(
        &self,
        updates: &BTreeMap<String, bool>,
    ) -> Result<NotificationUpdate, RegistryError>;
}

#[derive(Debug, Deserialize, Default)]
struct RegistryFile {
    #[serde(default)]
    devices: Vec<DeviceDescriptor>,
}

pub struct YamlRegistry {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl YamlRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn read_text(&self) -> Result<String, RegistryError> {
        fs::read_to_string(&self.path).await.map_err(|source| RegistryError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn parse<T: serde::de::DeserializeOwned + Default>(&self, txt: &str) -> Result<T, RegistryError> {
        if txt.trim().is_empty() {
            return Ok(T::default());
        }
        serde_yaml::from_str(txt).map_err(|source| RegistryError::Yaml {
            path: self.path.clone(),
            source,
        })
    }

    async fn write_file(&self, doc: &Value) -> Result<(), RegistryError> {
        let txt = serde_yaml::to_string(doc).map_err(|source| RegistryError::Yaml {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let io_err = |source| RegistryError::Io { path: self.path.clone(), source };
        fs::write(&tmp, txt).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl RegistrySource for YamlRegistry {
    async fn load(&self) -> Result<Vec<DeviceDescriptor>, RegistryError> {
        let txt = self.read_text().await?;
        Ok(self.parse::<RegistryFile>(&txt)?.devices)
    }

    async fn set_notifications(
        &self,
        updates: &BTreeMap<String, bool>,
    ) -> Result<NotificationUpdate, RegistryError> {
        // serialize read-modify-write between concurrent settings requests
        let _guard = self.write_lock.lock().await;

        let txt = self.read_text().await?;
        // typed parse first so a write never lands on a registry `load` would reject
        self.parse::<RegistryFile>(&txt)?;
        let mut doc: Value = self.parse(&txt)?;

        let outcome = apply_notification_flags(&mut doc, updates);
        if !outcome.updated.is_empty() {
            self.write_file(&doc).await?;
            tracing::info!(path = %self.path.display(), updated = ?outcome.updated, "notification settings saved");
        }
        Ok(outcome)
    }
}

/// Sets `notifications_enabled` on every `devices:` entry named in `updates`.
fn apply_notification_flags(doc: &mut Value, updates: &BTreeMap<String, bool>) -> NotificationUpdate {
    let mut outcome = NotificationUpdate::default();
    let mut entries: Vec<&mut serde_yaml::Mapping> = doc
        .get_mut("devices")
        .and_then(Value::as_sequence_mut)
        .map(|seq| seq.iter_mut().filter_map(Value::as_mapping_mut).collect())
        .unwrap_or_default();

    for (name, enabled) in updates {
        let mut found = false;
        for entry in entries.iter_mut() {
            if entry.get("name").and_then(Value::as_str) == Some(name.as_str()) {
                entry.insert(Value::from("notifications_enabled"), Value::Bool(*enabled));
                found = true;
            }
        }
        if found {
            outcome.updated.push(name.clone());
        } else {
            outcome.unknown.push(name.clone());
        }
    }
    outcome
}

/// name -> notifications_enabled, as served by `GET /api/settings`.
pub fn notification_flags(devices: &[DeviceDescriptor]) -> BTreeMap<String, bool> {
    devices
        .iter()
        .map(|d| (d.name.clone(), d.notifications_enabled))
        .collect()
}
