//! Internal implementation modules for `vx-core`.
//!
//! Callers should use the re-exports at the crate root rather than importing
//! these modules directly.

pub mod config;
pub mod envs;
pub mod errors;
pub mod outcome;
pub mod process;
pub mod python;
pub mod relaunch;
