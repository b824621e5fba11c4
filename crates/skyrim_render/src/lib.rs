use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde_json::{Map as JsonMap, Value as JsonValue};
use skyrim_core::core_api::{MigrationReport, RecoveryOutcome};
use skyrim_core::registry::CharacterRegistry;
use skyrim_core::save_header::SaveSummary;

const NAME_COL_WIDTH: usize = 24;
const LABEL_WIDTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextRenderOptions {
    /// List every save path under its character.
    pub verbose: bool,
}

pub fn registry_to_json(registry: &CharacterRegistry) -> JsonValue {
    let current = registry.current().map(|c| c.name.as_str());
    let characters = registry
        .iter()
        .map(|c| {
            let mut obj = JsonMap::new();
            obj.insert("name".to_string(), JsonValue::String(c.name.clone()));
            obj.insert(
                "current".to_string(),
                JsonValue::Bool(current == Some(c.name.as_str())),
            );
            obj.insert(
                "saves".to_string(),
                JsonValue::Array(c.saves.iter().map(|p| path_to_json(p)).collect()),
            );
            JsonValue::Object(obj)
        })
        .collect();

    let mut out = JsonMap::new();
    out.insert(
        "current".to_string(),
        current.map_or(JsonValue::Null, |name| JsonValue::String(name.to_string())),
    );
    out.insert("characters".to_string(), JsonValue::Array(characters));
    JsonValue::Object(out)
}

pub fn render_registry_text(registry: &CharacterRegistry, options: TextRenderOptions) -> String {
    let mut out = String::new();
    if registry.is_empty() {
        writeln!(&mut out, "No characters registered.").expect("writing to String cannot fail");
        return out;
    }

    let current = registry.current().map(|c| c.name.as_str());
    writeln!(&mut out, "Characters ({})", registry.len()).expect("writing to String cannot fail");
    for character in registry.iter() {
        let marker = if current == Some(character.name.as_str()) {
            '*'
        } else {
            ' '
        };
        let count = character.saves.len();
        writeln!(
            &mut out,
            "{marker} {:<width$} {count} save{}",
            fit_column(&character.name, NAME_COL_WIDTH),
            if count == 1 { "" } else { "s" },
            width = NAME_COL_WIDTH
        )
        .expect("writing to String cannot fail");
        if options.verbose {
            for save in &character.saves {
                writeln!(&mut out, "    {}", save.display())
                    .expect("writing to String cannot fail");
            }
        }
    }
    out
}

pub fn summary_to_json(summary: &SaveSummary) -> JsonValue {
    let mut out = JsonMap::new();
    out.insert(
        "name".to_string(),
        JsonValue::String(summary.character_name.clone()),
    );
    out.insert("save_number".to_string(), optional(summary.save_number));
    out.insert("level".to_string(), optional(summary.level));
    out.insert("race".to_string(), optional(summary.race.clone()));
    out.insert(
        "sex".to_string(),
        optional(summary.sex.map(|s| s.to_string())),
    );
    out.insert("location".to_string(), optional(summary.location.clone()));
    out.insert("game_date".to_string(), optional(summary.game_date.clone()));
    JsonValue::Object(out)
}

pub fn render_summary_text(summary: &SaveSummary) -> String {
    let mut out = String::new();
    write_field(&mut out, "Name", &summary.character_name);
    if let Some(n) = summary.save_number {
        write_field(&mut out, "Save", &format!("#{n}"));
    }
    if let Some(level) = summary.level {
        write_field(&mut out, "Level", &level.to_string());
    }
    if let Some(race) = &summary.race {
        write_field(&mut out, "Race", race);
    }
    if let Some(sex) = summary.sex {
        write_field(&mut out, "Sex", &sex.to_string());
    }
    if let Some(location) = &summary.location {
        write_field(&mut out, "Location", location);
    }
    if let Some(date) = &summary.game_date {
        write_field(&mut out, "Date", date);
    }
    out
}

pub fn report_to_json(report: &MigrationReport) -> JsonValue {
    let mut out = JsonMap::new();
    out.insert(
        "backup".to_string(),
        report.backup.as_deref().map_or(JsonValue::Null, path_to_json),
    );
    out.insert(
        "characters".to_string(),
        JsonValue::Array(
            report
                .characters
                .iter()
                .map(|name| JsonValue::String(name.clone()))
                .collect(),
        ),
    );
    out.insert(
        "relocated".to_string(),
        JsonValue::Array(
            report
                .relocated
                .iter()
                .map(|r| {
                    let mut obj = JsonMap::new();
                    obj.insert("character".to_string(), JsonValue::String(r.character.clone()));
                    obj.insert("from".to_string(), path_to_json(&r.from));
                    obj.insert("to".to_string(), path_to_json(&r.to));
                    JsonValue::Object(obj)
                })
                .collect(),
        ),
    );
    out.insert(
        "skipped".to_string(),
        JsonValue::Array(
            report
                .skipped
                .iter()
                .map(|s| {
                    let mut obj = JsonMap::new();
                    obj.insert("path".to_string(), path_to_json(&s.path));
                    obj.insert("reason".to_string(), JsonValue::String(s.reason.clone()));
                    JsonValue::Object(obj)
                })
                .collect(),
        ),
    );
    JsonValue::Object(out)
}

pub fn render_report_text(report: &MigrationReport) -> String {
    let mut out = String::new();
    if report.is_noop() {
        writeln!(&mut out, "Saves are already organized; nothing to do.")
            .expect("writing to String cannot fail");
        return out;
    }

    if let Some(backup) = &report.backup {
        write_field(&mut out, "Backup", &backup.display().to_string());
    }
    let found = if report.characters.is_empty() {
        "none".to_string()
    } else {
        report.characters.join(", ")
    };
    write_field(&mut out, "Found", &found);
    write_field(
        &mut out,
        "Moved",
        &format!("{} save(s)", report.relocated.len()),
    );
    for r in &report.relocated {
        writeln!(
            &mut out,
            "  {:<width$} {}",
            fit_column(&r.character, NAME_COL_WIDTH),
            r.to.display(),
            width = NAME_COL_WIDTH
        )
        .expect("writing to String cannot fail");
    }
    if !report.skipped.is_empty() {
        write_field(
            &mut out,
            "Skipped",
            &format!("{} file(s)", report.skipped.len()),
        );
        for s in &report.skipped {
            writeln!(&mut out, "  {}: {}", s.path.display(), s.reason)
                .expect("writing to String cannot fail");
        }
    }
    out
}

pub fn recovery_to_json(outcome: &RecoveryOutcome) -> JsonValue {
    let mut out = JsonMap::new();
    let (status, restored, removed): (&str, &[PathBuf], &[PathBuf]) = match outcome {
        RecoveryOutcome::Clean => ("clean", &[], &[]),
        RecoveryOutcome::Committed => ("committed", &[], &[]),
        RecoveryOutcome::RolledBack { restored, removed } => ("rolled_back", restored, removed),
    };
    out.insert("status".to_string(), JsonValue::String(status.to_string()));
    out.insert(
        "restored".to_string(),
        JsonValue::Array(restored.iter().map(|p| path_to_json(p)).collect()),
    );
    out.insert(
        "removed".to_string(),
        JsonValue::Array(removed.iter().map(|p| path_to_json(p)).collect()),
    );
    JsonValue::Object(out)
}

pub fn render_recovery_text(outcome: &RecoveryOutcome) -> String {
    match outcome {
        RecoveryOutcome::Clean => "No interrupted migration found.\n".to_string(),
        RecoveryOutcome::Committed => {
            "Last migration had finished; discarded its journal.\n".to_string()
        }
        RecoveryOutcome::RolledBack { restored, removed } => {
            let mut out = String::new();
            writeln!(
                &mut out,
                "Rolled back interrupted migration: {} restored, {} removed.",
                restored.len(),
                removed.len()
            )
            .expect("writing to String cannot fail");
            for path in restored {
                writeln!(&mut out, "  restored {}", path.display())
                    .expect("writing to String cannot fail");
            }
            for path in removed {
                writeln!(&mut out, "  removed  {}", path.display())
                    .expect("writing to String cannot fail");
            }
            out
        }
    }
}

fn write_field(out: &mut String, label: &str, value: &str) {
    let label = format!("{label}:");
    writeln!(out, "{label:>width$} {value}", width = LABEL_WIDTH)
        .expect("writing to String cannot fail");
}

fn path_to_json(path: &Path) -> JsonValue {
    JsonValue::String(path.display().to_string())
}

fn optional<T: Into<JsonValue>>(value: Option<T>) -> JsonValue {
    value.map_or(JsonValue::Null, Into::into)
}

fn fit_column(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    if width <= 3 {
        return value.chars().take(width).collect();
    }

    let mut out: String = value.chars().take(width - 3).collect();
    out.push_str("...");
    out
}
