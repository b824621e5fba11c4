mod engine;
mod error;
mod types;

pub use engine::MigrationEngine;
pub use error::{CoreError, CoreErrorCode};
pub use types::{
    DEFAULT_SAVE_EXTENSION, FULL_BACKUP_PREFIX, MigrationOptions, MigrationReport, MigrationState,
    RecoveryOutcome, Relocation, SkippedSave,
};
