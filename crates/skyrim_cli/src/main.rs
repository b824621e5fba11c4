use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value as JsonValue;
use skyrim_core::active_path::ActiveSavePath;
use skyrim_core::archive::ZipArchiver;
use skyrim_core::core_api::{CoreError, MigrationEngine, MigrationOptions, RecoveryOutcome};
use skyrim_core::ini::ParseMode;
use skyrim_core::registry::CharacterRegistry;
use skyrim_core::save_header::SaveSummary;
use skyrim_core::settings::{
    Settings, app_data_dir, default_game_data_dir, default_settings_path,
};
use skyrim_render::TextRenderOptions;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Settings file (defaults to the platform data directory)
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,
    /// Game data directory holding Skyrim.ini and Saves/
    #[arg(long = "game-data", global = true, value_name = "DIR")]
    game_data: Option<PathBuf>,
    /// Fail on malformed INI lines instead of skipping them
    #[arg(long = "strict-ini", global = true)]
    strict_ini: bool,
    /// Log more (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Back up the saves folder, then move every save into a folder per character
    Install {
        /// Copy saves instead of moving them
        #[arg(long)]
        copy: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show registered characters and their saves
    List {
        /// Print every save path
        #[arg(long)]
        saves: bool,
        #[arg(long)]
        json: bool,
    },
    /// Make NAME the active character and point Skyrim.ini at its folder
    Switch { name: String },
    /// Archive the saves folder, or a single character's folder
    Backup {
        #[arg(long, value_name = "NAME")]
        character: Option<String>,
    },
    /// Roll back a migration that was interrupted
    Recover {
        #[arg(long)]
        json: bool,
    },
    /// Print the header of a save file
    Inspect {
        #[arg(value_name = "SAVE.ess")]
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

struct Context {
    settings_path: PathBuf,
    settings: Settings,
    mode: ParseMode,
}

impl Context {
    fn load(cli: &Cli) -> Result<Self, CoreError> {
        let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
        let mut settings =
            Settings::load_or_default(&settings_path, Settings::new(default_game_data_dir()))?;
        if let Some(dir) = &cli.game_data {
            settings.paths.game_data = dir.clone();
        }
        debug!(
            settings = %settings_path.display(),
            game_data = %settings.paths.game_data.display(),
            "loaded settings"
        );
        Ok(Self {
            settings_path,
            settings,
            mode: if cli.strict_ini {
                ParseMode::Strict
            } else {
                ParseMode::Lenient
            },
        })
    }

    fn engine(&self, destructive: bool) -> MigrationEngine<ZipArchiver> {
        let options = MigrationOptions::new(
            self.settings.saves_dir(),
            app_data_dir(&self.settings_path),
            destructive,
        );
        MigrationEngine::new(options, ZipArchiver::new(), self.settings.migration_state())
    }

    fn registry(&self) -> Result<CharacterRegistry, CoreError> {
        CharacterRegistry::from_state(self.settings.characters.clone())
    }

    fn persist(&mut self, registry: &CharacterRegistry) -> Result<(), CoreError> {
        self.settings.characters = registry.to_state();
        self.settings.save(&self.settings_path)
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e.message);
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<(), CoreError> {
    if let Command::Inspect { path, json } = &cli.command {
        let summary = SaveSummary::read(path)?;
        if *json {
            print_json(&skyrim_render::summary_to_json(&summary));
        } else {
            print!("{}", skyrim_render::render_summary_text(&summary));
        }
        return Ok(());
    }

    let mut ctx = Context::load(cli)?;
    match &cli.command {
        Command::Install { copy, json } => {
            let mut engine = ctx.engine(!copy);
            let mut registry = ctx.registry()?;
            let report = engine.install_with(&mut registry, |registry| {
                ctx.settings.installed = true;
                ctx.persist(registry)
            })?;
            if *json {
                print_json(&skyrim_render::report_to_json(&report));
            } else {
                print!("{}", skyrim_render::render_report_text(&report));
            }
        }
        Command::List { saves, json } => {
            let registry = ctx.registry()?;
            if *json {
                print_json(&skyrim_render::registry_to_json(&registry));
            } else {
                let options = TextRenderOptions { verbose: *saves };
                print!("{}", skyrim_render::render_registry_text(&registry, options));
            }
        }
        Command::Switch { name } => {
            let mut registry = ctx.registry()?;
            let Some(character) = registry.find(name) else {
                return Err(CoreError::not_found(format!(
                    "character {name:?} is not registered"
                )));
            };
            let canonical = character.name.clone();
            registry.subscribe(Box::new(ActiveSavePath::for_game_data(
                &ctx.settings.paths.game_data,
                ctx.mode,
            )));
            let synced = registry.set_current(&canonical);
            ctx.persist(&registry)?;
            synced?;
            println!("Active character: {canonical}");
        }
        Command::Backup { character } => {
            let registry = ctx.registry()?;
            let target = match character {
                Some(name) => Some(registry.find(name).ok_or_else(|| {
                    CoreError::not_found(format!("character {name:?} is not registered"))
                })?),
                None => None,
            };
            let archive = ctx.engine(true).backup(target)?;
            println!("Wrote backup to {}", archive.display());
        }
        Command::Recover { json } => {
            let outcome = ctx.engine(true).recover()?;
            if matches!(outcome, RecoveryOutcome::RolledBack { .. }) && ctx.settings.installed {
                ctx.settings.installed = false;
                ctx.settings.save(&ctx.settings_path)?;
            }
            if *json {
                print_json(&skyrim_render::recovery_to_json(&outcome));
            } else {
                print!("{}", skyrim_render::render_recovery_text(&outcome));
            }
        }
        Command::Inspect { .. } => {}
    }
    Ok(())
}

fn print_json(value: &JsonValue) {
    let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("Error rendering JSON output: {e}");
        process::exit(1);
    });
    println!("{rendered}");
}
