use std::path::PathBuf;

use vx_domain::EnvName;

/// Failure taxonomy for the bootstrap pipeline.
///
/// Every variant names the environment it concerns so a human can locate and
/// inspect the directory when automatic provisioning keeps failing. None of
/// these are retried internally; each one terminates the invocation that hit
/// it.
#[derive(thiserror::Error, Debug)]
pub enum BootstrapError {
    /// The environment directory could not be built: base toolchain missing,
    /// directory creation denied, or a partial directory that creation could
    /// not complete.
    #[error("could not create environment `{name}`: {detail}")]
    Creation { name: EnvName, detail: String },

    /// The environment's installer exited non-zero. `stderr` carries the
    /// installer's diagnostic output verbatim.
    #[error("package install failed for environment `{name}`: {stderr}")]
    Install { name: EnvName, stderr: String },

    /// The target interpreter could not be launched even though setup
    /// reported success. Fatal: the caller is never silently left running
    /// unprovisioned.
    #[error("could not launch `{}` for environment `{}`: {}", .interpreter.display(), .name, .detail)]
    Spawn {
        name: EnvName,
        interpreter: PathBuf,
        detail: String,
    },
}

impl BootstrapError {
    /// Process exit code for this failure class when surfaced at top level.
    /// Distinct codes let calling automation tell "could not build the
    /// environment" from "could not install dependencies" from launch
    /// failure.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Creation { .. } => 3,
            Self::Install { .. } => 4,
            Self::Spawn { .. } => 5,
        }
    }

    #[must_use]
    pub fn env_name(&self) -> &EnvName {
        match self {
            Self::Creation { name, .. } | Self::Install { name, .. } | Self::Spawn { name, .. } => {
                name
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let name = EnvName::custom("demo");
        let creation = BootstrapError::Creation {
            name: name.clone(),
            detail: "venv failed".into(),
        };
        let install = BootstrapError::Install {
            name: name.clone(),
            stderr: "no matching distribution".into(),
        };
        let spawn = BootstrapError::Spawn {
            name,
            interpreter: PathBuf::from("/tmp/env/bin/python"),
            detail: "no such file".into(),
        };
        let codes = [creation.exit_code(), install.exit_code(), spawn.exit_code()];
        assert_eq!(codes, [3, 4, 5]);
    }

    #[test]
    fn messages_carry_identity_and_diagnostics() {
        let err = BootstrapError::Install {
            name: EnvName::custom("fetch-tool"),
            stderr: "ERROR: No matching distribution found for pkgx==9.9".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("fetch-tool"));
        assert!(rendered.contains("No matching distribution"));
    }
}
