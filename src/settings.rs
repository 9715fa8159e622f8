use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use crate::capture::{
    game::{DESKTOP_TARGET_RADIUS, MOBILE_TARGET_RADIUS},
    GameConfig, GuidedConfig,
};
use crate::landmarks::evaluate::{DEFAULT_GUIDE_REGION_FRACTION, DEFAULT_OPEN_PALM_THRESHOLD};
use crate::source::DetectorOptions;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const USER_AGENT_ENV: &str = "PALMPRINT_USER_AGENT";

const MOBILE_MARKERS: [&str; 9] = [
    "android",
    "iphone",
    "ipad",
    "ipod",
    "mobile",
    "webos",
    "blackberry",
    "iemobile",
    "opera mini",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FormFactor {
    Mobile,
    Desktop,
}

impl FormFactor {
    pub fn from_identity(identity: &str) -> Self {
        let identity = identity.to_ascii_lowercase();
        if MOBILE_MARKERS.iter().any(|marker| identity.contains(marker)) {
            FormFactor::Mobile
        } else {
            FormFactor::Desktop
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GuidedTimings {
    pub action_ms: u64,
    pub hold_ms: u64,
    pub rearm_ms: u64,
}

impl Default for GuidedTimings {
    fn default() -> Self {
        let config = GuidedConfig::default();
        Self {
            action_ms: config.action_ms,
            hold_ms: config.hold_ms,
            rearm_ms: config.rearm_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GameTimings {
    pub rules_ms: u64,
    pub game_ms: u64,
    pub hold_ms: u64,
    pub rules_placeholder_secs: u64,
}

impl Default for GameTimings {
    fn default() -> Self {
        let config = GameConfig::default();
        Self {
            rules_ms: config.rules_ms,
            game_ms: config.game_ms,
            hold_ms: config.hold_ms,
            rules_placeholder_secs: config.rules_placeholder_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureSettings {
    /// Authenticated user; records fall back to `"unknown"` without one.
    pub user_id: Option<String>,
    /// Browser/device identity string used to pick the target size.
    pub device_identity: Option<String>,
    pub guided: GuidedTimings,
    pub game: GameTimings,
    pub open_palm_threshold: f64,
    pub guide_region_fraction: f64,
    pub mobile_target_radius: f64,
    pub desktop_target_radius: f64,
    pub detector: DetectorOptions,
    pub video_width: u32,
    pub video_height: u32,
    pub frame_interval_ms: u64,
    pub detect_timeout_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            user_id: None,
            device_identity: None,
            guided: GuidedTimings::default(),
            game: GameTimings::default(),
            open_palm_threshold: DEFAULT_OPEN_PALM_THRESHOLD,
            guide_region_fraction: DEFAULT_GUIDE_REGION_FRACTION,
            mobile_target_radius: MOBILE_TARGET_RADIUS,
            desktop_target_radius: DESKTOP_TARGET_RADIUS,
            detector: DetectorOptions::default(),
            video_width: 640,
            video_height: 480,
            frame_interval_ms: 16,
            detect_timeout_ms: 1_000,
        }
    }
}

impl CaptureSettings {
    /// Resolved once at startup; the environment wins over the settings file.
    pub fn form_factor(&self) -> FormFactor {
        let identity = std::env::var(USER_AGENT_ENV)
            .ok()
            .or_else(|| self.device_identity.clone())
            .unwrap_or_default();
        FormFactor::from_identity(&identity)
    }

    pub fn guided_config(&self) -> GuidedConfig {
        GuidedConfig {
            action_ms: self.guided.action_ms,
            hold_ms: self.guided.hold_ms,
            rearm_ms: self.guided.rearm_ms,
            region_fraction: self.guide_region_fraction,
        }
    }

    pub fn game_config(&self, form_factor: FormFactor) -> GameConfig {
        let target_radius = match form_factor {
            FormFactor::Mobile => self.mobile_target_radius,
            FormFactor::Desktop => self.desktop_target_radius,
        };
        GameConfig {
            rules_ms: self.game.rules_ms,
            game_ms: self.game.game_ms,
            hold_ms: self.game.hold_ms,
            target_radius,
            open_palm_threshold: self.open_palm_threshold,
            rules_placeholder_secs: self.game.rules_placeholder_secs,
        }
    }

    pub fn video_size(&self) -> (u32, u32) {
        (self.video_width, self.video_height)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<CaptureSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!(
                    "Ignoring unreadable settings at {}: {err}",
                    path.display()
                );
                CaptureSettings::default()
            })
        } else {
            CaptureSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> CaptureSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: CaptureSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn set_user_id(&self, user_id: Option<String>) -> Result<()> {
        let mut settings = self.settings();
        settings.user_id = user_id;
        self.update(settings)
    }

    fn persist(&self, data: &CaptureSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn recognises_mobile_identities() {
        let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15";
        let android = "Mozilla/5.0 (Linux; Android 14; Pixel 8) Mobile Safari/537.36";
        let desktop = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/126.0 Safari/537.36";

        assert_eq!(FormFactor::from_identity(iphone), FormFactor::Mobile);
        assert_eq!(FormFactor::from_identity(android), FormFactor::Mobile);
        assert_eq!(FormFactor::from_identity(desktop), FormFactor::Desktop);
        assert_eq!(FormFactor::from_identity(""), FormFactor::Desktop);
    }

    #[test]
    fn target_radius_follows_form_factor() {
        let settings = CaptureSettings::default();
        assert_eq!(settings.game_config(FormFactor::Mobile).target_radius, 0.12);
        assert_eq!(settings.game_config(FormFactor::Desktop).target_radius, 0.07);
    }

    #[test]
    fn defaults_match_capture_constants() {
        let settings = CaptureSettings::default();
        assert_eq!(settings.guided_config(), GuidedConfig::default());
        assert_eq!(settings.game_config(FormFactor::Desktop), GameConfig::default());
        assert_eq!(settings.video_size(), (640, 480));
        assert_eq!(settings.detector.min_detection_confidence, 0.7);
        assert_eq!(settings.detector.min_tracking_confidence, 0.5);
    }

    #[test]
    fn missing_file_gives_defaults_and_updates_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.settings(), CaptureSettings::default());

        store.set_user_id(Some("carol".into())).unwrap();
        assert!(path.exists());

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.settings().user_id.as_deref(), Some("carol"));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"guided":{"holdMs":2500},"frameIntervalMs":33}"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().settings();
        assert_eq!(settings.guided.hold_ms, 2_500);
        assert_eq!(settings.guided.action_ms, 4_000);
        assert_eq!(settings.frame_interval_ms, 33);
        assert_eq!(settings.open_palm_threshold, 0.15);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.settings(), CaptureSettings::default());
    }
}
