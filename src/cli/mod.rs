//! Command-line surface: `serve`, `list-tools`, `list-workflows`, `doctor`.

pub mod commands;
pub mod doctor;

pub use commands::run;
