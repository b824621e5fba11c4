//! Persistent manager settings, stored as JSON next to the backups.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core_api::{CoreError, CoreErrorCode, MigrationState};
use crate::registry::RegistryState;

pub const SETTINGS_FILE: &str = "settings.json";
pub const SAVES_DIR: &str = "Saves";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPaths {
    pub game_data: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub auto_save: bool,
    pub paths: SettingsPaths,
    #[serde(default)]
    pub characters: RegistryState,
}

impl Settings {
    pub fn new(game_data: PathBuf) -> Self {
        Self {
            installed: false,
            auto_save: false,
            paths: SettingsPaths {
                game_data,
                install: None,
            },
            characters: RegistryState::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| CoreError::format(format!("{}: {e}", path.display())))
    }

    /// Load `path`, falling back to `defaults` when the file does not exist yet.
    pub fn load_or_default(path: &Path, defaults: Settings) -> Result<Self, CoreError> {
        match Self::load(path) {
            Err(e) if e.code == CoreErrorCode::NotFound => {
                debug!(settings = %path.display(), "no settings file; using defaults");
                Ok(defaults)
            }
            other => other,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }
        let mut text = serde_json::to_string_pretty(self).map_err(|e| {
            CoreError::new(CoreErrorCode::Io, format!("failed to encode settings: {e}"))
        })?;
        text.push('\n');
        fs::write(path, text).map_err(|e| CoreError::io(path, e))
    }

    pub fn saves_dir(&self) -> PathBuf {
        self.paths.game_data.join(SAVES_DIR)
    }

    pub fn migration_state(&self) -> MigrationState {
        if self.installed {
            MigrationState::Installed
        } else {
            MigrationState::NotInstalled
        }
    }
}

/// Platform data directory for the manager:
/// `~/.local/share/skyrimmanager` on Linux, `%APPDATA%\Skyrim Manager\data` on Windows.
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "Skyrim Manager")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./skyrim_manager"))
}

pub fn default_settings_path() -> PathBuf {
    default_data_dir().join(SETTINGS_FILE)
}

/// `<Documents>/My Games/Skyrim`, where the game keeps its INI and saves.
pub fn default_game_data_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.document_dir().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("My Games")
        .join("Skyrim")
}

/// Directory holding backups and the migration journal for a settings file.
pub fn app_data_dir(settings_path: &Path) -> PathBuf {
    match settings_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
