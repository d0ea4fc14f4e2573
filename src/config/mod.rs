// src/config/mod.rs

//! Configuration loading and validation for autodeploy.
//!
//! - `model.rs`: the TOML-backed data model.
//! - `loader.rs`: reading from disk, default scaffold.
//! - `validate.rs`: `[config]` typing and `[settings]` rule parsing.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    DEFAULT_SCAFFOLD, LoadOutcome, default_config_path, load_and_validate, load_from_path,
    load_or_scaffold,
};
pub use model::{ConfigFile, ConfigSection, RawConfigFile, SkippedRule};
pub use validate::parse_rule;
