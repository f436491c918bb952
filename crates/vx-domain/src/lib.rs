#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod identity;
pub mod project;
pub mod requirements;

pub use identity::{compute_identity, EnvName};
pub use project::discover_project_root;
pub use requirements::RequirementSet;
