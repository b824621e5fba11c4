use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::archive::{Archiver, CompressionHint};
use crate::journal::{self, JournalEntry, MigrationJournal};
use crate::registry::{Character, CharacterRegistry};
use crate::save_header;

use super::error::{CoreError, CoreErrorCode};
use super::types::{
    FULL_BACKUP_PREFIX, MigrationOptions, MigrationReport, MigrationState, RecoveryOutcome,
    Relocation, SkippedSave,
};

/// Backs up the saves directory, then moves every save into a directory
/// named after its character.
#[derive(Debug)]
pub struct MigrationEngine<A> {
    options: MigrationOptions,
    archiver: A,
    state: MigrationState,
}

impl<A: Archiver> MigrationEngine<A> {
    pub fn new(options: MigrationOptions, archiver: A, state: MigrationState) -> Self {
        Self {
            options,
            archiver,
            state,
        }
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    pub fn install(
        &mut self,
        registry: &mut CharacterRegistry,
    ) -> Result<MigrationReport, CoreError> {
        self.install_with(registry, |_| Ok(()))
    }

    /// Run the pass and hand the finished registry to `persist` before the
    /// journal is committed.
    ///
    /// If `persist` fails the journal stays on disk and the engine stays
    /// `Installing`, so `recover` can put the saves back.
    pub fn install_with<F>(
        &mut self,
        registry: &mut CharacterRegistry,
        persist: F,
    ) -> Result<MigrationReport, CoreError>
    where
        F: FnOnce(&CharacterRegistry) -> Result<(), CoreError>,
    {
        match self.state {
            MigrationState::Installed => {
                debug!("saves already organized; nothing to do");
                return Ok(MigrationReport::default());
            }
            MigrationState::Installing => {
                return Err(interrupted(&self.options.journal_path));
            }
            MigrationState::NotInstalled => {}
        }

        if self.options.journal_path.exists() {
            return Err(interrupted(&self.options.journal_path));
        }

        if !registry.is_empty() {
            info!(
                characters = registry.len(),
                "registry already populated; marking installed without migrating"
            );
            persist(registry)?;
            self.state = MigrationState::Installed;
            return Ok(MigrationReport::default());
        }

        self.state = MigrationState::Installing;
        let mut report = MigrationReport::default();

        let prepared = self.backup(None).and_then(|backup| {
            report.backup = Some(backup);
            self.discover(registry, &mut report)
        });
        if let Err(e) = prepared {
            self.state = MigrationState::NotInstalled;
            return Err(e);
        }

        let journal = self.relocate(registry, &mut report)?;
        if let Err(e) = persist(registry) {
            warn!(
                journal = %journal.path().display(),
                error = %e,
                "registry was not saved; leaving the pass uncommitted"
            );
            return Err(e);
        }
        journal.commit()?;
        self.state = MigrationState::Installed;
        info!(
            characters = report.characters.len(),
            relocated = report.relocated.len(),
            skipped = report.skipped.len(),
            "migration committed"
        );
        Ok(report)
    }

    /// Archive the whole saves directory, or one character's directory.
    pub fn backup(&self, character: Option<&Character>) -> Result<PathBuf, CoreError> {
        let stamp = unix_timestamp();
        let (source, stem) = match character {
            None => (
                self.options.saves_dir.clone(),
                format!("{FULL_BACKUP_PREFIX}{stamp}"),
            ),
            Some(c) => (
                self.options.saves_dir.join(&c.name),
                format!("Characters_{}_Backup_{stamp}", c.name),
            ),
        };
        if !source.is_dir() {
            return Err(CoreError::not_found(format!(
                "cannot back up {}: directory does not exist",
                source.display()
            )));
        }

        let destination = unused_archive_path(&self.options.backups_dir, &stem);
        self.archiver
            .create_archive(&source, &destination, CompressionHint::Fastest)?;

        let len = fs::metadata(&destination)
            .map_err(|e| CoreError::io(&destination, e))?
            .len();
        if len == 0 {
            return Err(CoreError::new(
                CoreErrorCode::Io,
                format!("backup archive {} is empty", destination.display()),
            ));
        }
        info!(archive = %destination.display(), bytes = len, "backup written");
        Ok(destination)
    }

    /// Undo the relocations of a pass that never committed.
    pub fn recover(&mut self) -> Result<RecoveryOutcome, CoreError> {
        let path = self.options.journal_path.clone();
        let Some(entries) = journal::read_journal(&path)? else {
            if self.state == MigrationState::Installing {
                self.state = MigrationState::NotInstalled;
            }
            return Ok(RecoveryOutcome::Clean);
        };

        if entries.contains(&JournalEntry::Commit) {
            journal::remove(&path)?;
            return Ok(RecoveryOutcome::Committed);
        }

        let pairs: Vec<(&Path, &Path)> = entries
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Copying { from, to } => Some((from.as_path(), to.as_path())),
                _ => None,
            })
            .collect();

        let mut restored = Vec::new();
        let mut removed = Vec::new();
        for &(from, to) in pairs.iter().rev() {
            if !to.exists() {
                continue;
            }
            if from.exists() {
                fs::remove_file(to).map_err(|e| CoreError::io(to, e))?;
                removed.push(to.to_path_buf());
            } else {
                move_file(to, from)?;
                restored.push(from.to_path_buf());
            }
        }

        let mut dirs: Vec<&Path> = pairs.iter().filter_map(|(_, to)| to.parent()).collect();
        dirs.sort();
        dirs.dedup();
        for dir in dirs {
            if fs::remove_dir(dir).is_ok() {
                debug!(dir = %dir.display(), "removed empty character directory");
            }
        }

        journal::remove(&path)?;
        self.state = MigrationState::NotInstalled;
        warn!(
            restored = restored.len(),
            removed = removed.len(),
            "rolled back interrupted migration"
        );
        Ok(RecoveryOutcome::RolledBack { restored, removed })
    }

    fn discover(
        &self,
        registry: &mut CharacterRegistry,
        report: &mut MigrationReport,
    ) -> Result<(), CoreError> {
        for path in self.enumerate_saves()? {
            let name = match save_header::read_character_name(&path)
                .and_then(|name| check_directory_name(&name).map(|_| name))
            {
                Ok(name) => name,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable save");
                    report.skipped.push(SkippedSave {
                        path,
                        reason: e.message,
                    });
                    continue;
                }
            };

            if !registry.contains(&name) {
                registry.add(Character::new(name.clone()))?;
            }
            debug!(character = %name, path = %path.display(), "discovered save");
            registry.record_save(&name, path)?;
        }

        report.characters = registry.names().into_iter().map(str::to_string).collect();
        info!(characters = report.characters.len(), "discovery finished");
        Ok(())
    }

    fn enumerate_saves(&self) -> Result<Vec<PathBuf>, CoreError> {
        let dir = &self.options.saves_dir;
        let entries = fs::read_dir(dir).map_err(|e| CoreError::io(dir, e))?;

        let mut saves = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CoreError::io(dir, e))?;
            let path = entry.path();
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.options.extension));
            if is_file && matches {
                saves.push(path);
            }
        }
        saves.sort();
        Ok(saves)
    }

    /// Move or copy every discovered save. The returned journal is not yet
    /// committed.
    fn relocate(
        &self,
        registry: &mut CharacterRegistry,
        report: &mut MigrationReport,
    ) -> Result<MigrationJournal, CoreError> {
        let mut journal = MigrationJournal::create(&self.options.journal_path)?;
        journal.append(&JournalEntry::Begin {
            destructive: self.options.destructive,
        })?;

        let plan: Vec<(String, Vec<PathBuf>)> = registry
            .iter()
            .map(|c| (c.name.clone(), c.saves.clone()))
            .collect();

        for (name, saves) in plan {
            let dir = self.options.saves_dir.join(&name);
            fs::create_dir_all(&dir).map_err(|e| CoreError::io(&dir, e))?;

            for from in saves {
                let Some(file_name) = from.file_name() else {
                    continue;
                };
                let to = dir.join(file_name);
                if to == from {
                    continue;
                }
                if to.exists() {
                    return Err(CoreError::new(
                        CoreErrorCode::Io,
                        format!("{} already exists; refusing to overwrite it", to.display()),
                    ));
                }

                journal.append(&JournalEntry::Copying {
                    from: from.clone(),
                    to: to.clone(),
                })?;
                copy_verified(&from, &to)?;
                journal.append(&JournalEntry::Copied {
                    from: from.clone(),
                    to: to.clone(),
                })?;

                if self.options.destructive {
                    fs::remove_file(&from).map_err(|e| CoreError::io(&from, e))?;
                    journal.append(&JournalEntry::SourceRemoved { from: from.clone() })?;
                }

                registry.replace_save(&name, &from, to.clone())?;
                info!(character = %name, from = %from.display(), to = %to.display(), "relocated save");
                report.relocated.push(Relocation {
                    character: name.clone(),
                    from,
                    to,
                });
            }
        }

        Ok(journal)
    }
}

fn interrupted(journal_path: &Path) -> CoreError {
    CoreError::new(
        CoreErrorCode::Interrupted,
        format!(
            "an earlier migration did not finish (journal at {}); run recover first",
            journal_path.display()
        ),
    )
}

/// Reject names that cannot be used as a single directory component.
fn check_directory_name(name: &str) -> Result<(), CoreError> {
    let bad = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(CoreError::format(format!(
            "character name {name:?} cannot be used as a directory name"
        )));
    }
    Ok(())
}

fn copy_verified(from: &Path, to: &Path) -> Result<(), CoreError> {
    let expected = fs::metadata(from)
        .map_err(|e| CoreError::io(from, e))?
        .len();
    let copied = fs::copy(from, to).map_err(|e| CoreError::io(from, e))?;
    if copied != expected {
        return Err(CoreError::new(
            CoreErrorCode::Io,
            format!(
                "short copy from {} to {}: {copied} of {expected} bytes",
                from.display(),
                to.display()
            ),
        ));
    }
    Ok(())
}

fn move_file(from: &Path, to: &Path) -> Result<(), CoreError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_verified(from, to)?;
    fs::remove_file(from).map_err(|e| CoreError::io(from, e))
}

/// `<stem>.zip`, or `<stem>_<n>.zip` for the first free `n` when taken.
fn unused_archive_path(dir: &Path, stem: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{stem}.zip"));
    let mut n = 1u32;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}_{n}.zip"));
        n += 1;
    }
    candidate
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
