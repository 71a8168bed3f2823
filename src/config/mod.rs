// src/config/mod.rs

//! Pipeline configuration: TOML model, loading, and semantic validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigFile, PipelineSection, StageConfig};
pub use validate::validate_config;
