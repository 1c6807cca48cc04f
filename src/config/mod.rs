// src/config/mod.rs

//! Test specification loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a spec file and its includes from disk (`loader.rs`).
//! - Validate basic invariants like prerequisite correctness (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_suite, SpecGroup, Suite};
pub use model::{HarnessSection, RawSpecFile, SpecFile, TestConfig, PREREQ_ALL};
pub use validate::validate_spec;
