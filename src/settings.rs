//! Process-wide settings, persisted as a small JSON file next to the data
//! directory. Not scoped to any branch; currently just the round-off flag
//! applied to bill totals.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const GLOBAL_SETTINGS_FILE: &str = "global_settings.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalSettings {
    /// When set, bill grand totals are rounded half-up to the nearest
    /// whole amount at creation time.
    pub round_off: bool,
}

pub fn global_settings_path(root: &Path) -> PathBuf {
    root.join(GLOBAL_SETTINGS_FILE)
}

/// Load the global settings, falling back to defaults when the file is
/// missing or unreadable. A corrupt settings file must never block billing.
pub fn load_global_settings(root: &Path) -> GlobalSettings {
    let path = global_settings_path(root);
    match fs::read_to_string(&path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "global settings unparseable, using defaults");
            GlobalSettings::default()
        }),
        Err(_) => GlobalSettings::default(),
    }
}

pub fn save_global_settings(root: &Path, settings: &GlobalSettings) -> Result<(), String> {
    let path = global_settings_path(root);
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {e}"))?;
    fs::write(&path, json).map_err(|e| format!("Failed to save settings: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_file_missing_or_corrupt() {
        let dir = TempDir::new().expect("temp dir");
        assert_eq!(load_global_settings(dir.path()), GlobalSettings::default());

        fs::write(global_settings_path(dir.path()), b"{ not json").expect("write");
        assert_eq!(load_global_settings(dir.path()), GlobalSettings::default());
    }

    #[test]
    fn round_trips_camel_case_keys() {
        let dir = TempDir::new().expect("temp dir");
        let settings = GlobalSettings { round_off: true };
        save_global_settings(dir.path(), &settings).expect("save");

        let raw = fs::read_to_string(global_settings_path(dir.path())).expect("read");
        assert!(raw.contains("roundOff"), "legacy camelCase key expected: {raw}");
        assert_eq!(load_global_settings(dir.path()), settings);
    }
}
