//! Append-only record of a migration pass, one JSON object per line.
//!
//! Each entry is flushed to disk before the step it describes runs, so a
//! journal without `Commit` marks a pass that did not finish.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core_api::{CoreError, CoreErrorCode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalEntry {
    Begin { destructive: bool },
    Copying { from: PathBuf, to: PathBuf },
    Copied { from: PathBuf, to: PathBuf },
    SourceRemoved { from: PathBuf },
    Commit,
}

#[derive(Debug)]
pub struct MigrationJournal {
    path: PathBuf,
    file: File,
}

impl MigrationJournal {
    /// Start a fresh journal. Fails if one already exists.
    pub fn create(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| CoreError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, entry: &JournalEntry) -> Result<(), CoreError> {
        let mut line = serde_json::to_vec(entry).map_err(|e| {
            CoreError::new(CoreErrorCode::Io, format!("failed to encode journal entry: {e}"))
        })?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|_| self.file.sync_data())
            .map_err(|e| CoreError::io(&self.path, e))
    }

    /// Record `Commit` and remove the journal file.
    pub fn commit(mut self) -> Result<(), CoreError> {
        self.append(&JournalEntry::Commit)?;
        let path = self.path.clone();
        drop(self);
        remove(&path)
    }
}

/// Read every entry of an existing journal. `Ok(None)` when there is none.
///
/// A torn final line (a crash mid-write) is ignored; a bad line anywhere
/// else is a format error.
pub fn read_journal(path: &Path) -> Result<Option<Vec<JournalEntry>>, CoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CoreError::io(path, e)),
    };

    let lines = BufReader::new(file)
        .lines()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::io(path, e))?;

    let mut entries = Vec::with_capacity(lines.len());
    let last = lines.len().saturating_sub(1);
    for (index, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            Err(e) if index == last => {
                warn!(journal = %path.display(), "ignoring torn journal tail: {e}");
            }
            Err(e) => {
                return Err(CoreError::format(format!(
                    "{}: line {}: {e}",
                    path.display(),
                    index + 1
                )));
            }
        }
    }
    Ok(Some(entries))
}

pub fn remove(path: &Path) -> Result<(), CoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CoreError::io(path, e)),
    }
}
