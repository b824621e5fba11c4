use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

struct Workspace {
    _dir: tempfile::TempDir,
    game_data: PathBuf,
    settings: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let game_data = dir.path().join("My Games").join("Skyrim");
        fs::create_dir_all(game_data.join("Saves")).expect("failed to create saves dir");
        fs::write(
            game_data.join("Skyrim.ini"),
            "[General]\nsLanguage=ENGLISH\nSLocalSavePath=Saves\\\n",
        )
        .expect("failed to write ini");
        let settings = dir.path().join("app").join("settings.json");
        Self {
            _dir: dir,
            game_data,
            settings,
        }
    }

    fn write_save(&self, file_name: &str, character: &str) -> PathBuf {
        let path = self.game_data.join("Saves").join(file_name);
        fs::write(&path, save_bytes(character)).expect("failed to write save");
        path
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_skyrim-manager"))
            .arg("--settings")
            .arg(&self.settings)
            .arg("--game-data")
            .arg(&self.game_data)
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .expect("failed to run skyrim-manager CLI")
    }
}

fn save_bytes(character: &str) -> Vec<u8> {
    let mut bytes = b"TESV_SAVEGAME".to_vec();
    bytes.resize(21, 0);
    bytes.extend_from_slice(&3u32.to_le_bytes());
    bytes.extend_from_slice(&(character.len() as u16).to_le_bytes());
    bytes.extend_from_slice(character.as_bytes());
    bytes.extend_from_slice(&12u32.to_le_bytes());
    bytes
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn as_path(value: &Value) -> &Path {
    Path::new(value.as_str().expect("path should be a string"))
}

#[test]
fn inspect_reports_character_name() {
    let ws = Workspace::new();
    let save = ws.write_save("quicksave.ess", "Lydia");

    let output = ws.run(&["inspect", "--json", &save.to_string_lossy()]);
    let value = stdout_json(&output);
    assert_eq!(value["name"], "Lydia");
    assert_eq!(value["save_number"], 3);
    assert_eq!(value["level"], 12);
    assert!(value["location"].is_null());
}

#[test]
fn install_then_list_shows_grouped_saves() {
    let ws = Workspace::new();
    ws.write_save("save1.ess", "Alice");
    ws.write_save("save2.ess", "Bob");
    ws.write_save("save3.ess", "alice");

    let report = stdout_json(&ws.run(&["install", "--json"]));
    assert_eq!(report["characters"], serde_json::json!(["Alice", "Bob"]));
    assert_eq!(report["relocated"].as_array().map(Vec::len), Some(3));
    assert!(as_path(&report["backup"]).is_file());
    assert!(ws.settings.is_file());

    let listing = stdout_json(&ws.run(&["list", "--json"]));
    let characters = listing["characters"]
        .as_array()
        .expect("characters should be an array");
    assert_eq!(characters[0]["name"], "Alice");
    let alice_saves: Vec<PathBuf> = characters[0]["saves"]
        .as_array()
        .expect("saves should be an array")
        .iter()
        .map(|v| as_path(v).to_path_buf())
        .collect();
    assert_eq!(
        alice_saves,
        [
            ws.game_data.join("Saves").join("Alice").join("save1.ess"),
            ws.game_data.join("Saves").join("Alice").join("save3.ess"),
        ]
    );
    assert!(listing["current"].is_null());

    let again = ws.run(&["install"]);
    assert!(again.status.success());
    assert!(String::from_utf8_lossy(&again.stdout).contains("nothing to do"));
}

#[test]
fn install_with_copy_keeps_originals() {
    let ws = Workspace::new();
    let original = ws.write_save("save1.ess", "Alice");

    let output = ws.run(&["install", "--copy"]);
    assert!(output.status.success());
    assert_eq!(fs::read(&original).unwrap(), save_bytes("Alice"));
    assert!(ws.game_data.join("Saves").join("Alice").join("save1.ess").is_file());
}

#[cfg(unix)]
#[test]
fn unwritable_settings_leave_install_recoverable() {
    let ws = Workspace::new();
    let save = ws.write_save("save1.ess", "Alice");
    let app = ws.settings.parent().expect("settings has a parent");
    fs::create_dir_all(app).expect("failed to create app dir");
    std::os::unix::fs::symlink(app.join("missing").join("settings.json"), &ws.settings)
        .expect("failed to link settings");

    let output = ws.run(&["install"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(app.join("migration.journal").is_file());

    let again = ws.run(&["install"]);
    assert_eq!(again.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&again.stderr);
    assert!(stderr.contains("recover"), "{stderr}");

    let recovered = stdout_json(&ws.run(&["recover", "--json"]));
    assert_eq!(recovered["status"], "rolled_back");
    assert_eq!(fs::read(&save).unwrap(), save_bytes("Alice"));
    assert!(!ws.game_data.join("Saves").join("Alice").exists());
    assert!(!app.join("migration.journal").exists());
}

#[test]
fn switch_updates_ini_and_settings() {
    let ws = Workspace::new();
    ws.write_save("save1.ess", "Alice");
    assert!(ws.run(&["install"]).status.success());

    let output = ws.run(&["switch", "ALICE"]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "Active character: Alice"
    );

    let ini = fs::read_to_string(ws.game_data.join("Skyrim.ini")).unwrap();
    let expected = Path::new("Saves").join("Alice");
    assert!(
        ini.contains(&format!("SLocalSavePath={}", expected.display())),
        "{ini}"
    );
    assert!(ini.contains("sLanguage=ENGLISH"));

    let listing = stdout_json(&ws.run(&["list", "--json"]));
    assert_eq!(listing["current"], "Alice");
}

#[test]
fn switch_to_unknown_character_fails() {
    let ws = Workspace::new();
    let output = ws.run(&["switch", "Zed"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("Error: "), "{stderr}");
    assert!(stderr.contains("Zed"));
}

#[test]
fn backup_and_recover_on_clean_workspace() {
    let ws = Workspace::new();
    ws.write_save("save1.ess", "Alice");

    let output = ws.run(&["backup"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Wrote backup to "), "{stdout}");
    assert!(stdout.contains("Characters_FullBackup_"));

    let recovered = stdout_json(&ws.run(&["recover", "--json"]));
    assert_eq!(recovered["status"], "clean");
}

#[test]
fn missing_subcommand_is_a_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_skyrim-manager"))
        .output()
        .expect("failed to run skyrim-manager CLI");
    assert_eq!(output.status.code(), Some(2));
}
