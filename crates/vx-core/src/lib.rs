#![deny(clippy::all, warnings)]

mod core;

pub use vx_domain::{EnvName, RequirementSet};

pub use crate::core::config::{Config, ENVS_DIR_ENV, PYTHON_ENV, SETUP_TIMEOUT_ENV};
pub use crate::core::envs::{EnvHandle, EnvStore};
pub use crate::core::errors::BootstrapError;
pub use crate::core::outcome::{CommandStatus, ExecutionOutcome};
pub use crate::core::process::RunOutput;
pub use crate::core::python::{current_interpreter, detect_base_interpreter};
pub use crate::core::relaunch::{
    exec_script, AutoRelaunch, Decision, Invocation, Phase, Provisioned, ProvisionedReason,
    RELAUNCH_MARKER,
};
