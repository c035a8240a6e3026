//! DocQL translation server
//!
//! Serves the persisted schema and exposes the compiler and result decoder
//! over HTTP. The `discover` subcommand builds that schema from a document
//! export.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod dump;
pub mod logging;
pub mod routes;

pub use catalog::{CatalogError, SchemaCatalog};
pub use cli::{Cli, Command};
pub use config::{Config, ConfigError};
pub use dump::{discover_export, DumpError, DumpStore};
pub use routes::{router, ApiError, AppState};
