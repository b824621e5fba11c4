//! Characters and the saves attributed to them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core_api::CoreError;

/// Key used for every comparison, lookup and uniqueness check on character names.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub saves: Vec<PathBuf>,
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            saves: Vec::new(),
        }
    }
}

/// Serializable snapshot of a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub current: Option<String>,
}

/// Called synchronously every time the current character is assigned.
pub trait CurrentCharacterObserver {
    fn current_changed(&mut self, current: Option<&Character>) -> Result<(), CoreError>;
}

#[derive(Default)]
pub struct CharacterRegistry {
    characters: Vec<Character>,
    index: BTreeMap<String, usize>,
    current: Option<usize>,
    observers: Vec<Box<dyn CurrentCharacterObserver>>,
}

impl std::fmt::Debug for CharacterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacterRegistry")
            .field("characters", &self.characters)
            .field("current", &self.current)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl CharacterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from a snapshot. Observers are not notified.
    pub fn from_state(state: RegistryState) -> Result<Self, CoreError> {
        let mut registry = Self::new();
        for Character { name, saves } in state.characters {
            registry.add(Character::new(name.clone()))?;
            for path in saves {
                registry.record_save(&name, path)?;
            }
        }
        if let Some(name) = state.current {
            let pos = registry.position(&name).ok_or_else(|| {
                CoreError::not_found(format!("current character {name:?} is not registered"))
            })?;
            registry.current = Some(pos);
        }
        Ok(registry)
    }

    pub fn to_state(&self) -> RegistryState {
        RegistryState {
            characters: self.characters.clone(),
            current: self.current().map(|c| c.name.clone()),
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn CurrentCharacterObserver>) {
        self.observers.push(observer);
    }

    pub fn add(&mut self, character: Character) -> Result<(), CoreError> {
        let key = normalize_name(&character.name);
        if let Some(&pos) = self.index.get(&key) {
            return Err(CoreError::name_conflict(format!(
                "character {:?} conflicts with existing {:?}",
                character.name, self.characters[pos].name
            )));
        }
        debug!(name = %character.name, "registered character");
        self.index.insert(key, self.characters.len());
        self.characters.push(character);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&Character> {
        self.position(name).map(|pos| &self.characters[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Character> {
        self.characters.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.characters.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Which character a save path is attributed to, if any.
    pub fn owner_of(&self, path: &Path) -> Option<&Character> {
        self.characters
            .iter()
            .find(|c| c.saves.iter().any(|p| p == path))
    }

    /// Append a save path to a character's ordered list.
    pub fn record_save(&mut self, name: &str, path: PathBuf) -> Result<(), CoreError> {
        let pos = self.require(name)?;
        if let Some(owner) = self.owner_of(&path) {
            return Err(CoreError::name_conflict(format!(
                "{} is already attributed to {:?}",
                path.display(),
                owner.name
            )));
        }
        self.characters[pos].saves.push(path);
        Ok(())
    }

    /// Swap one recorded path for another, keeping its position.
    pub fn replace_save(&mut self, name: &str, old: &Path, new: PathBuf) -> Result<(), CoreError> {
        let pos = self.require(name)?;
        if old != new.as_path()
            && let Some(owner) = self.owner_of(&new)
        {
            return Err(CoreError::name_conflict(format!(
                "{} is already attributed to {:?}",
                new.display(),
                owner.name
            )));
        }
        let character = &mut self.characters[pos];
        let Some(slot) = character.saves.iter().position(|p| p == old) else {
            return Err(CoreError::not_found(format!(
                "{} is not recorded for {:?}",
                old.display(),
                character.name
            )));
        };
        character.saves[slot] = new;
        Ok(())
    }

    pub fn current(&self) -> Option<&Character> {
        self.current.map(|pos| &self.characters[pos])
    }

    /// Point `current` at `name` and notify every observer, even if nothing changed.
    pub fn set_current(&mut self, name: &str) -> Result<(), CoreError> {
        let pos = self.require(name)?;
        self.current = Some(pos);
        self.notify()
    }

    pub fn clear_current(&mut self) -> Result<(), CoreError> {
        self.current = None;
        self.notify()
    }

    fn notify(&mut self) -> Result<(), CoreError> {
        let current = self.current.map(|pos| &self.characters[pos]);
        let mut first_error = None;
        for observer in &mut self.observers {
            if let Err(e) = observer.current_changed(current) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&normalize_name(name)).copied()
    }

    fn require(&self, name: &str) -> Result<usize, CoreError> {
        self.position(name)
            .ok_or_else(|| CoreError::not_found(format!("character {name:?} is not registered")))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;

    use super::{
        Character, CharacterRegistry, CurrentCharacterObserver, RegistryState, normalize_name,
    };
    use crate::core_api::{CoreError, CoreErrorCode};

    struct Recorder(Rc<RefCell<Vec<Option<String>>>>);

    impl CurrentCharacterObserver for Recorder {
        fn current_changed(&mut self, current: Option<&Character>) -> Result<(), CoreError> {
            self.0.borrow_mut().push(current.map(|c| c.name.clone()));
            Ok(())
        }
    }

    struct Failing;

    impl CurrentCharacterObserver for Failing {
        fn current_changed(&mut self, _: Option<&Character>) -> Result<(), CoreError> {
            Err(CoreError::new(CoreErrorCode::Io, "disk full"))
        }
    }

    fn registry_with(names: &[&str]) -> CharacterRegistry {
        let mut registry = CharacterRegistry::new();
        for name in names {
            registry.add(Character::new(*name)).unwrap();
        }
        registry
    }

    #[test]
    fn names_are_normalized_once() {
        assert_eq!(normalize_name("Ulfric"), normalize_name("ULFRIC"));
        assert_eq!(normalize_name("Ærin"), normalize_name("æRIN"));
    }

    #[test]
    fn add_rejects_case_insensitive_duplicates() {
        let mut registry = registry_with(&["Alice"]);
        let err = registry.add(Character::new("aLICE")).unwrap_err();
        assert_eq!(err.code, CoreErrorCode::NameConflict);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn find_and_contains_ignore_case() {
        let registry = registry_with(&["Alice", "Bob"]);
        assert!(registry.contains("bob"));
        assert_eq!(registry.find("ALICE").map(|c| c.name.as_str()), Some("Alice"));
        assert!(registry.find("Carol").is_none());
        assert_eq!(registry.names(), ["Alice", "Bob"]);
    }

    #[test]
    fn set_current_notifies_even_when_unchanged() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut registry = registry_with(&["Alice", "Bob"]);
        registry.subscribe(Box::new(Recorder(seen.clone())));

        registry.set_current("alice").unwrap();
        registry.set_current("Alice").unwrap();
        registry.clear_current().unwrap();

        assert_eq!(
            *seen.borrow(),
            [Some("Alice".to_string()), Some("Alice".to_string()), None]
        );
    }

    #[test]
    fn set_current_unknown_name_is_not_found_and_silent() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut registry = registry_with(&["Alice"]);
        registry.subscribe(Box::new(Recorder(seen.clone())));

        let err = registry.set_current("Zed").unwrap_err();
        assert_eq!(err.code, CoreErrorCode::NotFound);
        assert!(seen.borrow().is_empty());
        assert!(registry.current().is_none());
    }

    #[test]
    fn every_observer_runs_and_first_error_is_returned() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut registry = registry_with(&["Alice"]);
        registry.subscribe(Box::new(Failing));
        registry.subscribe(Box::new(Recorder(seen.clone())));

        let err = registry.set_current("Alice").unwrap_err();
        assert_eq!(err.code, CoreErrorCode::Io);
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(registry.current().map(|c| c.name.as_str()), Some("Alice"));
    }

    #[test]
    fn a_path_belongs_to_one_character() {
        let mut registry = registry_with(&["Alice", "Bob"]);
        registry.record_save("Alice", PathBuf::from("a.ess")).unwrap();
        let err = registry
            .record_save("Bob", PathBuf::from("a.ess"))
            .unwrap_err();
        assert_eq!(err.code, CoreErrorCode::NameConflict);
        assert_eq!(
            registry.owner_of(Path::new("a.ess")).map(|c| c.name.as_str()),
            Some("Alice")
        );
    }

    #[test]
    fn replace_save_keeps_order() {
        let mut registry = registry_with(&["Alice"]);
        for name in ["1.ess", "2.ess", "3.ess"] {
            registry.record_save("Alice", PathBuf::from(name)).unwrap();
        }
        registry
            .replace_save("alice", Path::new("2.ess"), PathBuf::from("Alice/2.ess"))
            .unwrap();
        let saves = &registry.find("Alice").unwrap().saves;
        assert_eq!(
            saves,
            &[
                PathBuf::from("1.ess"),
                PathBuf::from("Alice/2.ess"),
                PathBuf::from("3.ess")
            ]
        );

        let err = registry
            .replace_save("Alice", Path::new("missing.ess"), PathBuf::from("x.ess"))
            .unwrap_err();
        assert_eq!(err.code, CoreErrorCode::NotFound);
    }

    #[test]
    fn state_round_trip_restores_current_without_notifying() {
        let mut registry = registry_with(&["Alice", "Bob"]);
        registry.record_save("Bob", PathBuf::from("b.ess")).unwrap();
        registry.set_current("Bob").unwrap();

        let state = registry.to_state();
        let restored = CharacterRegistry::from_state(state.clone()).unwrap();
        assert_eq!(restored.to_state(), state);
        assert_eq!(restored.current().map(|c| c.name.as_str()), Some("Bob"));
    }

    #[test]
    fn state_with_duplicate_names_is_rejected() {
        let state = RegistryState {
            characters: vec![Character::new("Alice"), Character::new("ALICE")],
            current: None,
        };
        let err = CharacterRegistry::from_state(state).unwrap_err();
        assert_eq!(err.code, CoreErrorCode::NameConflict);
    }
}
