//! Character name extraction from `.ess` save headers.
//!
//! The header opens with the 13-byte `TESV_SAVEGAME` magic, a u32 header
//! size, a u32 format version and a u32 save number. The player name
//! follows as a u16-length-prefixed UTF-8 string, so the length always sits
//! at offsets 25..27 and the name bytes start at offset 27.

use std::fmt;
use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core_api::CoreError;
use crate::reader::LittleEndianReader;

pub const SIGNATURE: &[u8; 13] = b"TESV_SAVEGAME";
pub const SAVE_NUMBER_OFFSET: u64 = 21;
pub const NAME_LENGTH_OFFSET: u64 = 25;
pub const NAME_OFFSET: u64 = 27;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerSex {
    Male,
    Female,
    Unknown(u16),
}

impl PlayerSex {
    pub const MALE_RAW: u16 = 0;
    pub const FEMALE_RAW: u16 = 1;

    pub fn from_raw(raw: u16) -> Self {
        match raw {
            Self::MALE_RAW => Self::Male,
            Self::FEMALE_RAW => Self::Female,
            other => Self::Unknown(other),
        }
    }

    pub fn raw(&self) -> u16 {
        match *self {
            Self::Male => Self::MALE_RAW,
            Self::Female => Self::FEMALE_RAW,
            Self::Unknown(other) => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for PlayerSex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Unknown(v) => write!(f, "Unknown ({})", v),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Decode the character name stored at the fixed header offsets.
pub fn character_name(bytes: &[u8]) -> Result<String, CoreError> {
    let mut r = LittleEndianReader::new(Cursor::new(bytes));
    read_name(&mut r, bytes.len())
}

/// Read a save file from disk and decode its character name.
pub fn read_character_name(path: &Path) -> Result<String, CoreError> {
    let bytes = fs::read(path).map_err(|e| CoreError::io(path, e))?;
    character_name(&bytes)
        .map_err(|e| CoreError::new(e.code, format!("{}: {}", path.display(), e.message)))
}

fn read_name<R: io::Read + io::Seek>(
    r: &mut LittleEndianReader<R>,
    available: usize,
) -> Result<String, CoreError> {
    let truncated = |needed: u64| {
        CoreError::format(format!(
            "save header truncated: need {needed} bytes, got {available}"
        ))
    };

    r.seek_to(NAME_LENGTH_OFFSET)
        .and_then(|_| r.read_u16())
        .map_err(|_| truncated(NAME_OFFSET))
        .and_then(|len| {
            let needed = NAME_OFFSET + u64::from(len);
            r.read_bytes(len as usize).map_err(|_| truncated(needed))
        })
        .and_then(|raw| {
            String::from_utf8(raw).map_err(|e| {
                CoreError::format(format!(
                    "character name at offset {NAME_OFFSET} is not valid UTF-8 (bad byte at offset {})",
                    NAME_OFFSET + e.utf8_error().valid_up_to() as u64
                ))
            })
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSummary {
    pub character_name: String,
    pub save_number: Option<u32>,
    pub level: Option<u32>,
    pub location: Option<String>,
    pub game_date: Option<String>,
    pub race: Option<String>,
    pub sex: Option<PlayerSex>,
}

impl SaveSummary {
    /// Parse the name and, when the signature is present, whatever header
    /// fields follow it. A truncated tail leaves the later fields unset.
    pub fn parse(bytes: &[u8]) -> Result<Self, CoreError> {
        let mut r = LittleEndianReader::new(Cursor::new(bytes));
        let character_name = read_name(&mut r, bytes.len())?;
        let mut summary = Self {
            character_name,
            save_number: None,
            level: None,
            location: None,
            game_date: None,
            race: None,
            sex: None,
        };

        if bytes.starts_with(SIGNATURE) {
            let _ = summary.read_tail(&mut r);
            if let Ok(n) = r.seek_to(SAVE_NUMBER_OFFSET).and_then(|_| r.read_u32()) {
                summary.save_number = Some(n);
            }
        }

        Ok(summary)
    }

    pub fn read(path: &Path) -> Result<Self, CoreError> {
        let bytes = fs::read(path).map_err(|e| CoreError::io(path, e))?;
        Self::parse(&bytes)
            .map_err(|e| CoreError::new(e.code, format!("{}: {}", path.display(), e.message)))
    }

    fn read_tail<R: io::Read + io::Seek>(
        &mut self,
        r: &mut LittleEndianReader<R>,
    ) -> io::Result<()> {
        self.level = Some(r.read_u32()?);
        self.location = Some(r.read_wstring()?);
        self.game_date = Some(r.read_wstring()?);
        self.race = Some(r.read_wstring()?);
        self.sex = Some(PlayerSex::from_raw(r.read_u16()?));
        Ok(())
    }
}
