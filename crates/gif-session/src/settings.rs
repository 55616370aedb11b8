use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::EngineOptions;

/// Persisted playback defaults applied to newly opened sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    pub version: u32,
    #[serde(default = "default_speed_factor")]
    pub speed_factor: f32,
    /// Overrides the file's loop count (0 = infinite).
    #[serde(default)]
    pub loop_count: Option<u16>,
    #[serde(default = "default_min_frame_delay_ms")]
    pub min_frame_delay_ms: u64,
    #[serde(default = "default_driver_thread_name")]
    pub driver_thread_name: String,
}

fn default_speed_factor() -> f32 {
    1.0
}

fn default_min_frame_delay_ms() -> u64 {
    20
}

fn default_driver_thread_name() -> String {
    "gif-decode".into()
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            version: 1,
            speed_factor: default_speed_factor(),
            loop_count: None,
            min_frame_delay_ms: default_min_frame_delay_ms(),
            driver_thread_name: default_driver_thread_name(),
        }
    }
}

impl PlaybackSettings {
    /// `<config dir>/gif-session/settings.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gif-session").join("settings.json"))
    }

    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Missing or malformed files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed settings at {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) {
        let Some(path) = Self::default_path() else {
            return;
        };
        if let Err(e) = self.save_to(&path) {
            log::warn!("Failed to save settings: {e}");
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            min_frame_delay: Duration::from_millis(self.min_frame_delay_ms),
            loop_count: self.loop_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_defaults() {
        let s = PlaybackSettings::default();
        assert_eq!(s.speed_factor, 1.0);
        assert_eq!(s.engine_options(), EngineOptions::default());
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = PlaybackSettings {
            speed_factor: 2.5,
            loop_count: Some(3),
            ..PlaybackSettings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(PlaybackSettings::load_from(&path), settings);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let s: PlaybackSettings = serde_json::from_str(r#"{"version":1}"#).unwrap();
        assert_eq!(s, PlaybackSettings::default());
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert_eq!(PlaybackSettings::load_from(&path), PlaybackSettings::default());
        assert_eq!(
            PlaybackSettings::load_from(&dir.path().join("absent.json")),
            PlaybackSettings::default()
        );
    }
}
