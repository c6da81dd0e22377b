mod key_file;
mod store;

use std::env;
use std::path::PathBuf;

pub use key_file::{read_key_value, write_key_value};
pub use store::SettingsStore;

pub const API_KEY_NAME: &str = "GEMINI_API_KEY";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;
pub const MAX_REQUEST_TIMEOUT_S: f64 = 600.0;
pub const DEFAULT_WRITING_PROFILE: &str =
    "Write naturally in the same language and voice as the surrounding note.";

const CONFIG_DIR: &str = ".metascribe";
const ASSET_DIR: &str = "metascribe-assets";

const KEY_WRITING_PROFILE: &str = "writing_profile";
const KEY_TEXT_MODEL: &str = "text_model";
const KEY_IMAGE_MODEL: &str = "image_model";
const KEY_REQUEST_TIMEOUT: &str = "request_timeout_s";
const KEY_STALE_API_KEY: &str = "api_key";

/// Fixed on-disk locations, all relative to the document store root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsPaths {
    pub root: PathBuf,
    pub settings_file: PathBuf,
    pub key_file: PathBuf,
    pub asset_folder: PathBuf,
    pub diagnostics_log: PathBuf,
}

impl SettingsPaths {
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let config_dir = root.join(CONFIG_DIR);
        Self {
            settings_file: config_dir.join("settings.json"),
            key_file: config_dir.join(".env"),
            asset_folder: root.join(ASSET_DIR),
            diagnostics_log: config_dir.join("diagnostics.jsonl"),
            root,
        }
    }
}

/// Read-only configuration for one processing run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub writing_profile: String,
    pub api_key: Option<String>,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub request_timeout_s: f64,
    pub root: PathBuf,
    pub asset_folder: PathBuf,
    pub diagnostics_log: PathBuf,
}

impl Settings {
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Merges the structured store and the key file into one snapshot. The key
/// file is the only source for the secret; a leftover `api_key` entry in
/// the structured store is never used.
pub fn load_settings(paths: &SettingsPaths) -> anyhow::Result<Settings> {
    let api_base_override =
        non_empty_env("METASCRIBE_API_BASE").or_else(|| non_empty_env("GEMINI_API_BASE"));
    load_settings_with_base(paths, api_base_override)
}

pub fn load_settings_with_base(
    paths: &SettingsPaths,
    api_base_override: Option<String>,
) -> anyhow::Result<Settings> {
    let store = SettingsStore::new(&paths.settings_file);
    let api_key = read_key_value(&paths.key_file, API_KEY_NAME)?;
    let api_base = api_base_override
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let request_timeout_s = store
        .get_f64(KEY_REQUEST_TIMEOUT)
        .filter(|value| value.is_finite() && *value > 0.0)
        .map(|value| value.min(MAX_REQUEST_TIMEOUT_S))
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_S);

    Ok(Settings {
        writing_profile: non_empty(store.get_str(KEY_WRITING_PROFILE))
            .unwrap_or_else(|| DEFAULT_WRITING_PROFILE.to_string()),
        api_key,
        api_base,
        text_model: non_empty(store.get_str(KEY_TEXT_MODEL))
            .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
        image_model: non_empty(store.get_str(KEY_IMAGE_MODEL))
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
        request_timeout_s,
        root: paths.root.clone(),
        asset_folder: paths.asset_folder.clone(),
        diagnostics_log: paths.diagnostics_log.clone(),
    })
}

/// Persists the secret to the key file and drops any stale copy from the
/// structured store.
pub fn save_api_key(paths: &SettingsPaths, api_key: &str) -> anyhow::Result<()> {
    let trimmed = api_key.trim();
    if trimmed.is_empty() {
        anyhow::bail!("API key is empty");
    }
    write_key_value(&paths.key_file, API_KEY_NAME, trimmed)?;
    SettingsStore::new(&paths.settings_file).remove(KEY_STALE_API_KEY)?;
    Ok(())
}

pub fn save_writing_profile(paths: &SettingsPaths, profile: &str) -> anyhow::Result<bool> {
    SettingsStore::new(&paths.settings_file).set_str(KEY_WRITING_PROFILE, profile.trim())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn non_empty_env(key: &str) -> Option<String> {
    non_empty(env::var(key).ok())
}
