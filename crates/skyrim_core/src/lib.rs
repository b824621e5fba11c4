pub mod active_path;
pub mod archive;
pub mod core_api;
pub mod ini;
pub mod journal;
pub mod reader;
pub mod registry;
pub mod save_header;
pub mod settings;
