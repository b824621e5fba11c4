//! Keeps the game's `SLocalSavePath` pointed at the current character.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::core_api::CoreError;
use crate::ini::{IniDocument, ParseMode};
use crate::registry::{Character, CurrentCharacterObserver};

pub const GAME_INI_FILE: &str = "Skyrim.ini";
pub const GENERAL_SECTION: &str = "General";
pub const SAVE_PATH_KEY: &str = "SLocalSavePath";

#[derive(Debug)]
pub struct ActiveSavePath {
    ini_path: PathBuf,
    mode: ParseMode,
    document: Option<IniDocument>,
}

impl ActiveSavePath {
    pub fn new(ini_path: impl Into<PathBuf>, mode: ParseMode) -> Self {
        Self {
            ini_path: ini_path.into(),
            mode,
            document: None,
        }
    }

    pub fn for_game_data(game_data_dir: &Path, mode: ParseMode) -> Self {
        Self::new(game_data_dir.join(GAME_INI_FILE), mode)
    }

    /// Point the INI at `Saves/<name>` and write the whole document back.
    pub fn apply(&mut self, name: &str) -> Result<(), CoreError> {
        let document = match self.document.take() {
            Some(document) => document,
            None => IniDocument::load(&self.ini_path, self.mode)?,
        };
        let document = self.document.insert(document);

        let value = Path::new("Saves").join(name);
        document.set(
            GENERAL_SECTION,
            SAVE_PATH_KEY,
            value.to_string_lossy().into_owned(),
        )?;
        document.save(&self.ini_path)?;
        info!(ini = %self.ini_path.display(), save_path = %value.display(), "updated active save path");
        Ok(())
    }
}

impl CurrentCharacterObserver for ActiveSavePath {
    fn current_changed(&mut self, current: Option<&Character>) -> Result<(), CoreError> {
        match current {
            Some(character) => self.apply(&character.name),
            None => Ok(()),
        }
    }
}
