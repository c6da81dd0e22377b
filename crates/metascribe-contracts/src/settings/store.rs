use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

/// JSON object file holding user-editable settings.
///
/// Reads always refresh from disk so edits made by another process between
/// calls are picked up; writes merge the single changed key into the
/// current on-disk object.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        read_json_object(&self.path).and_then(|payload| payload.get(key).cloned())
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|value| value.as_str().map(str::to_string))
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|value| value.as_f64())
    }

    /// Returns `true` when the file was rewritten.
    pub fn set(&self, key: &str, value: Value) -> anyhow::Result<bool> {
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        if on_disk.get(key) == Some(&value) {
            return Ok(false);
        }
        on_disk.insert(key.to_string(), value);
        write_json_object(&self.path, &on_disk)?;
        Ok(true)
    }

    pub fn set_str(&self, key: &str, value: &str) -> anyhow::Result<bool> {
        self.set(key, Value::String(value.to_string()))
    }

    pub fn remove(&self, key: &str) -> anyhow::Result<bool> {
        let Some(mut on_disk) = read_json_object(&self.path) else {
            return Ok(false);
        };
        if on_disk.remove(key).is_none() {
            return Ok(false);
        }
        write_json_object(&self.path, &on_disk)?;
        Ok(true)
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}
