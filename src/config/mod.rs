// src/config/mod.rs

//! Network descriptions for plangraph.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a description from disk and write one back (`loader.rs`).
//! - Validate references, cardinality strings and link cycles (`validate.rs`).
//! - Build a `PlanGraph` from a checked description and snapshot one back
//!   (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str, save_to_path, to_toml_string};
pub use model::{
    ConstantConfig, ConstantValues, DatatypeConfig, LinkConfig, NetworkConfig, NetworkSection, NodeConfig,
    RawNetworkConfig, ToolConfig,
};
pub use validate::validate_config;
