// src/config/mod.rs

//! Configuration loading and validation for probevisor.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate durations, binary path and env overlay (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_optional};
pub use model::{BinarySection, ConfigFile, RawConfigFile, SupervisorSection};
