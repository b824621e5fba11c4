use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SAVE_EXTENSION: &str = "ess";
pub const FULL_BACKUP_PREFIX: &str = "Characters_FullBackup_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationState {
    NotInstalled,
    Installing,
    Installed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOptions {
    pub saves_dir: PathBuf,
    pub backups_dir: PathBuf,
    pub journal_path: PathBuf,
    /// Remove each source after it has been copied into its character directory.
    pub destructive: bool,
    pub extension: String,
}

impl MigrationOptions {
    pub fn new(saves_dir: PathBuf, app_data_dir: PathBuf, destructive: bool) -> Self {
        Self {
            saves_dir,
            backups_dir: app_data_dir.join("backups"),
            journal_path: app_data_dir.join("migration.journal"),
            destructive,
            extension: DEFAULT_SAVE_EXTENSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Relocation {
    pub character: String,
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkippedSave {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub backup: Option<PathBuf>,
    pub characters: Vec<String>,
    pub relocated: Vec<Relocation>,
    pub skipped: Vec<SkippedSave>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.backup.is_none() && self.relocated.is_empty() && self.skipped.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryOutcome {
    /// No journal was present.
    Clean,
    /// The journal recorded a finished pass and was discarded.
    Committed,
    RolledBack {
        restored: Vec<PathBuf>,
        removed: Vec<PathBuf>,
    },
}
