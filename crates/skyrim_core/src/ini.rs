//! Section/key configuration documents in the game's INI dialect.
//!
//! Headers are `[Name]` with alphanumeric and space characters only. Key
//! lines split at the first `=`. Comments and original spacing are not kept;
//! section order and key insertion order are.

use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::core_api::CoreError;

/// How the parser treats lines it cannot place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Skip malformed lines and keys outside a section; merge duplicate sections.
    #[default]
    Lenient,
    /// Fail on malformed lines, orphan keys and duplicate section names.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniSection {
    name: String,
    entries: Vec<(String, String)>,
}

impl IniSection {
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        if name.contains('[') || name.contains(']') {
            return Err(CoreError::format(format!(
                "section name {name:?} cannot contain brackets"
            )));
        }
        if !is_section_name(&name) {
            return Err(CoreError::format(format!(
                "section name {name:?} may only contain letters, digits and spaces"
            )));
        }
        Ok(Self {
            name,
            entries: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key`, replacing an existing value in place or appending a new entry.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), CoreError> {
        let key = key.into();
        let value = value.into();
        validate_key(&key)?;
        if value.contains(['\r', '\n']) {
            return Err(CoreError::format(format!(
                "value for key {key:?} in [{}] cannot contain line breaks",
                self.name
            )));
        }
        if value.starts_with(' ') {
            return Err(CoreError::format(format!(
                "value for key {key:?} in [{}] cannot start with a space",
                self.name
            )));
        }
        self.insert(key, value);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IniDocument {
    sections: Vec<IniSection>,
}

enum Line<'a> {
    Blank,
    Comment,
    Section(&'a str),
    Entry { key: &'a str, value: &'a str },
    Malformed,
}

impl IniDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str, mode: ParseMode) -> Result<Self, CoreError> {
        let mut doc = Self::new();
        let mut current: Option<usize> = None;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim_start_matches(' ');

            match classify(line) {
                Line::Blank | Line::Comment => {}
                Line::Section(name) => {
                    if mode == ParseMode::Strict && doc.position_ignore_case(name).is_some() {
                        return Err(CoreError::name_conflict(format!(
                            "line {line_no}: duplicate section [{name}]"
                        )));
                    }
                    match doc.position(name) {
                        Some(pos) => {
                            debug!(section = name, line = line_no, "merging duplicate section");
                            current = Some(pos);
                        }
                        None => {
                            doc.sections.push(IniSection {
                                name: name.to_string(),
                                entries: Vec::new(),
                            });
                            current = Some(doc.sections.len() - 1);
                        }
                    }
                }
                Line::Entry { key, value } => {
                    let Some(pos) = current else {
                        reject(mode, line_no, raw, "key outside of any section")?;
                        continue;
                    };
                    if key.is_empty() {
                        reject(mode, line_no, raw, "empty key")?;
                        continue;
                    }
                    if mode == ParseMode::Strict && !key.chars().all(|c| c.is_ascii_alphanumeric())
                    {
                        return Err(CoreError::format(format!(
                            "line {line_no}: key must be alphanumeric: {raw:?}"
                        )));
                    }
                    doc.sections[pos].insert(key.to_string(), value.to_string());
                }
                Line::Malformed => reject(mode, line_no, raw, "unrecognized line")?,
            }
        }

        Ok(doc)
    }

    pub fn load(path: &Path, mode: ParseMode) -> Result<Self, CoreError> {
        let text = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        Self::parse(&text, mode)
            .map_err(|e| CoreError::new(e.code, format!("{}: {}", path.display(), e.message)))
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        fs::write(path, self.to_string()).map_err(|e| CoreError::io(path, e))
    }

    pub fn sections(&self) -> impl Iterator<Item = &IniSection> {
        self.sections.iter()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.position(name).map(|pos| &self.sections[pos])
    }

    pub fn contains_section(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Append a new empty section. Names are unique ignoring case.
    pub fn add_section(&mut self, name: &str) -> Result<&mut IniSection, CoreError> {
        if let Some(pos) = self.position_ignore_case(name) {
            return Err(CoreError::name_conflict(format!(
                "section [{name}] conflicts with existing [{}]",
                self.sections[pos].name
            )));
        }
        self.sections.push(IniSection::new(name)?);
        let last = self.sections.len() - 1;
        Ok(&mut self.sections[last])
    }

    pub fn section_or_insert(&mut self, name: &str) -> Result<&mut IniSection, CoreError> {
        match self.position(name) {
            Some(pos) => Ok(&mut self.sections[pos]),
            None => self.add_section(name),
        }
    }

    pub fn remove_section(&mut self, name: &str) -> Result<IniSection, CoreError> {
        let pos = self
            .position(name)
            .ok_or_else(|| CoreError::not_found(format!("section [{name}] does not exist")))?;
        Ok(self.sections.remove(pos))
    }

    pub fn rename_section(&mut self, name: &str, new_name: &str) -> Result<(), CoreError> {
        let pos = self
            .position(name)
            .ok_or_else(|| CoreError::not_found(format!("section [{name}] does not exist")))?;
        if let Some(other) = self.position_ignore_case(new_name)
            && other != pos
        {
            return Err(CoreError::name_conflict(format!(
                "section [{new_name}] already exists"
            )));
        }
        let renamed = IniSection::new(new_name)?;
        self.sections[pos].name = renamed.name;
        Ok(())
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    /// Set a key, creating the section when it is missing.
    pub fn set(
        &mut self,
        section: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), CoreError> {
        self.section_or_insert(section)?.set(key, value)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.name == name)
    }

    fn position_ignore_case(&self, name: &str) -> Option<usize> {
        let wanted = name.to_lowercase();
        self.sections
            .iter()
            .position(|s| s.name.to_lowercase() == wanted)
    }
}

impl fmt::Display for IniDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for section in &self.sections {
            writeln!(f, "[{}]", section.name)?;
            for (key, value) in &section.entries {
                writeln!(f, "{key}={value}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn classify(line: &str) -> Line<'_> {
    let trimmed = line.trim_end();
    if trimmed.is_empty() {
        return Line::Blank;
    }
    if trimmed.starts_with(';') || trimmed.starts_with('#') {
        return Line::Comment;
    }
    if let Some(rest) = trimmed.strip_prefix('[') {
        return match rest.strip_suffix(']') {
            Some(name) if is_section_name(name) => Line::Section(name),
            _ => Line::Malformed,
        };
    }
    match line.split_once('=') {
        Some((key, value)) => Line::Entry {
            key: key.trim_end(),
            value: value.trim_start_matches(' '),
        },
        None => Line::Malformed,
    }
}

fn is_section_name(name: &str) -> bool {
    name.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ')
}

fn validate_key(key: &str) -> Result<(), CoreError> {
    let bad_start = key.starts_with(['[', ';', '#', ' ']);
    if key.is_empty() || bad_start || key.contains(['=', '\r', '\n']) || key.trim_end() != key {
        return Err(CoreError::format(format!("invalid key {key:?}")));
    }
    Ok(())
}

fn reject(mode: ParseMode, line_no: usize, raw: &str, reason: &str) -> Result<(), CoreError> {
    match mode {
        ParseMode::Strict => Err(CoreError::format(format!(
            "line {line_no}: {reason}: {raw:?}"
        ))),
        ParseMode::Lenient => {
            warn!(line = line_no, reason, "skipping INI line");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{IniDocument, IniSection, ParseMode};
    use crate::core_api::CoreErrorCode;

    const SKYRIM_INI: &str = "\
[General]
sLanguage=ENGLISH
SLocalSavePath=Saves\\Old
  uGridsToLoad=5

; audio settings
[Audio]
fMusicVolume = 0.6
";

    #[test]
    fn parses_sections_and_keys() {
        let doc = IniDocument::parse(SKYRIM_INI, ParseMode::Lenient).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get("General", "SLocalSavePath"), Some("Saves\\Old"));
        assert_eq!(doc.get("General", "uGridsToLoad"), Some("5"));
        assert_eq!(doc.get("Audio", "fMusicVolume"), Some("0.6"));
        assert_eq!(doc.get("general", "sLanguage"), None);
    }

    #[test]
    fn formats_sections_in_order_with_blank_separator() {
        let doc = IniDocument::parse(SKYRIM_INI, ParseMode::Lenient).unwrap();
        assert_eq!(
            doc.to_string(),
            "[General]\nsLanguage=ENGLISH\nSLocalSavePath=Saves\\Old\nuGridsToLoad=5\n\n\
             [Audio]\nfMusicVolume=0.6\n\n"
        );
    }

    #[test]
    fn last_write_to_a_key_wins() {
        let doc = IniDocument::parse("[A]\nk=1\nk=2\n", ParseMode::Strict).unwrap();
        assert_eq!(doc.get("A", "k"), Some("2"));
        assert_eq!(doc.section("A").unwrap().len(), 1);
    }

    #[test]
    fn lenient_skips_orphan_keys_and_garbage() {
        let text = "orphan=1\nnot a key line\n[A]\nk=v\n[broken\n";
        let doc = IniDocument::parse(text, ParseMode::Lenient).unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.get("A", "k"), Some("v"));
        assert_eq!(doc.get("A", "orphan"), None);
    }

    #[test]
    fn strict_rejects_orphan_keys_with_line_number() {
        let err = IniDocument::parse("\norphan=1\n[A]\n", ParseMode::Strict).unwrap_err();
        assert_eq!(err.code, CoreErrorCode::Format);
        assert!(err.message.starts_with("line 2"), "{}", err.message);
    }

    #[test]
    fn strict_rejects_unrecognized_lines() {
        let err = IniDocument::parse("[A]\nhello\n", ParseMode::Strict).unwrap_err();
        assert_eq!(err.code, CoreErrorCode::Format);
        let err = IniDocument::parse("[A]\nbad key=1\n", ParseMode::Strict).unwrap_err();
        assert_eq!(err.code, CoreErrorCode::Format);
    }

    #[test]
    fn lenient_merges_duplicate_sections() {
        let text = "[A]\nx=1\ny=1\n[B]\n[A]\ny=2\nz=3\n";
        let doc = IniDocument::parse(text, ParseMode::Lenient).unwrap();
        let names: Vec<&str> = doc.sections().map(IniSection::name).collect();
        assert_eq!(names, ["A", "B"]);
        assert_eq!(doc.get("A", "x"), Some("1"));
        assert_eq!(doc.get("A", "y"), Some("2"));
        assert_eq!(doc.get("A", "z"), Some("3"));
    }

    #[test]
    fn strict_rejects_duplicate_sections() {
        let err = IniDocument::parse("[A]\n[a]\n", ParseMode::Strict).unwrap_err();
        assert_eq!(err.code, CoreErrorCode::NameConflict);
    }

    #[test]
    fn section_names_reject_brackets() {
        let err = IniSection::new("[General]").unwrap_err();
        assert_eq!(err.code, CoreErrorCode::Format);
        assert!(IniSection::new("Display Main").is_ok());
    }

    #[test]
    fn add_rename_and_remove_sections() {
        let mut doc = IniDocument::new();
        doc.add_section("General").unwrap();
        doc.add_section("Display").unwrap();
        assert_eq!(
            doc.add_section("general").unwrap_err().code,
            CoreErrorCode::NameConflict
        );

        doc.rename_section("Display", "Graphics").unwrap();
        assert!(doc.contains_section("Graphics"));
        assert_eq!(
            doc.rename_section("Graphics", "GENERAL").unwrap_err().code,
            CoreErrorCode::NameConflict
        );
        assert_eq!(
            doc.rename_section("Missing", "Other").unwrap_err().code,
            CoreErrorCode::NotFound
        );

        doc.remove_section("Graphics").unwrap();
        assert!(!doc.contains_section("Graphics"));
        assert_eq!(
            doc.remove_section("Graphics").unwrap_err().code,
            CoreErrorCode::NotFound
        );
    }

    #[test]
    fn set_rejects_keys_and_values_that_cannot_round_trip() {
        let mut section = IniSection::new("General").unwrap();
        assert!(section.set("a=b", "1").is_err());
        assert!(section.set("", "1").is_err());
        assert!(section.set("k", "line\nbreak").is_err());
        assert_eq!(
            section.set("k", " padded").unwrap_err().code,
            CoreErrorCode::Format
        );
        section.set("k", "Saves\\My Saves ").unwrap();
        section.set("k", "v").unwrap();
        section.set("k", "w").unwrap();
        assert_eq!(section.iter().collect::<Vec<_>>(), [("k", "w")]);
        assert_eq!(section.remove("k").as_deref(), Some("w"));
        assert!(section.is_empty());
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let text = "\u{feff}[General]\r\nsLanguage=ENGLISH\r\n[Display]\r\niSizeW=1920\r\n";
        let doc = IniDocument::parse(text, ParseMode::Strict).unwrap();
        let names: Vec<&str> = doc.sections().map(IniSection::name).collect();
        assert_eq!(names, ["General", "Display"]);
        assert_eq!(doc.get("General", "sLanguage"), Some("ENGLISH"));
        assert!(!doc.to_string().contains('\u{feff}'));
    }

    #[test]
    fn set_creates_missing_section() {
        let mut doc = IniDocument::new();
        doc.set("General", "SLocalSavePath", "Saves\\Alice").unwrap();
        assert_eq!(doc.to_string(), "[General]\nSLocalSavePath=Saves\\Alice\n\n");
    }
}
