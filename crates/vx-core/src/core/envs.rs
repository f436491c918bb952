//! The environment repository: naming, creation, provisioning, and path
//! resolution for isolated script environments.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};
use vx_domain::{EnvName, RequirementSet};

use crate::core::config::Config;
use crate::core::errors::BootstrapError;
use crate::core::process;
use crate::core::python;

/// Repository of isolated environments under one base directory.
///
/// An environment's existence is inferred from filesystem state: it exists
/// iff its interpreter executable is present at the platform-specific
/// location. There is no separate metadata file to drift out of sync.
#[derive(Debug, Clone)]
pub struct EnvStore {
    root: PathBuf,
    python_override: Option<String>,
    setup_timeout: Option<Duration>,
}

/// Resolved paths of one environment.
#[derive(Debug, Clone)]
pub struct EnvHandle {
    name: EnvName,
    dir: PathBuf,
}

impl EnvHandle {
    #[must_use]
    pub fn name(&self) -> &EnvName {
        &self.name
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn bin_dir(&self) -> PathBuf {
        bin_dir_in(&self.dir)
    }

    /// Absolute path of the environment's interpreter. The POSIX/Windows
    /// layout divergence lives here and nowhere else.
    #[must_use]
    pub fn interpreter(&self) -> PathBuf {
        interpreter_in(&self.dir)
    }

    /// Absolute path of the environment's package installer.
    #[must_use]
    pub fn installer(&self) -> PathBuf {
        installer_in(&self.dir)
    }
}

impl EnvStore {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            root: config.envs_root().to_path_buf(),
            python_override: config.python_override().map(ToOwned::to_owned),
            setup_timeout: config.setup_timeout(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn handle(&self, name: &EnvName) -> EnvHandle {
        EnvHandle {
            name: name.clone(),
            dir: self.env_dir(name),
        }
    }

    #[must_use]
    pub fn env_dir(&self, name: &EnvName) -> PathBuf {
        self.root.join(name.as_str())
    }

    #[must_use]
    pub fn interpreter_path(&self, name: &EnvName) -> PathBuf {
        interpreter_in(&self.env_dir(name))
    }

    /// Cheap filesystem check; never probes the interpreter itself.
    #[must_use]
    pub fn exists(&self, name: &EnvName) -> bool {
        self.interpreter_path(name).is_file()
    }

    /// Builds the environment directory with the base toolchain.
    ///
    /// A pre-existing directory is the success path, not an error: it is
    /// either a concurrent creator or the leftovers of a failed attempt, and
    /// `python -m venv` completes missing pieces without clearing what is
    /// already there. After the call the interpreter must exist; a partial
    /// directory that still lacks one fails clearly.
    pub fn create(&self, name: &EnvName) -> Result<EnvHandle, BootstrapError> {
        let handle = self.handle(name);
        fs::create_dir_all(&self.root).map_err(|err| BootstrapError::Creation {
            name: name.clone(),
            detail: format!("could not create base directory {}: {err}", self.root.display()),
        })?;
        let base = python::detect_base_interpreter(self.python_override.as_deref()).map_err(
            |err| BootstrapError::Creation {
                name: name.clone(),
                detail: format!("{err:#}"),
            },
        )?;
        info!(env = %name, base = %base.display(), "creating environment");

        let args: Vec<OsString> = vec![
            OsString::from("-m"),
            OsString::from("venv"),
            handle.dir().as_os_str().to_owned(),
        ];
        let output = process::run_command(&base, &args, self.setup_timeout).map_err(|err| {
            BootstrapError::Creation {
                name: name.clone(),
                detail: format!("{err:#}"),
            }
        })?;
        if output.timed_out {
            return Err(BootstrapError::Creation {
                name: name.clone(),
                detail: format!("`{} -m venv` timed out", base.display()),
            });
        }
        if output.code != 0 {
            return Err(BootstrapError::Creation {
                name: name.clone(),
                detail: format!("`{} -m venv` exited with {}: {}", base.display(), output.code, output.stderr.trim()),
            });
        }
        if !self.exists(name) {
            return Err(BootstrapError::Creation {
                name: name.clone(),
                detail: format!(
                    "no interpreter at {} after creation",
                    self.interpreter_path(name).display()
                ),
            });
        }
        Ok(handle)
    }

    /// Runs the environment's installer over the requirement set. Always
    /// re-invoked on setup; installing an already-satisfied requirement is
    /// the installer's no-op, not ours. No internal retry.
    pub fn install(
        &self,
        handle: &EnvHandle,
        requirements: &RequirementSet,
    ) -> Result<(), BootstrapError> {
        if requirements.is_empty() {
            debug!(env = %handle.name(), "no requirements to install");
            return Ok(());
        }
        let pip = handle.installer();
        let mut args: Vec<OsString> = vec![
            OsString::from("install"),
            OsString::from("--disable-pip-version-check"),
        ];
        args.extend(requirements.iter().map(OsString::from));
        info!(
            env = %handle.name(),
            count = requirements.as_slice().len(),
            "installing requirements"
        );
        let output = process::run_command(&pip, &args, self.setup_timeout).map_err(|err| {
            BootstrapError::Install {
                name: handle.name().clone(),
                stderr: format!("{err:#}"),
            }
        })?;
        if output.timed_out {
            return Err(BootstrapError::Install {
                name: handle.name().clone(),
                stderr: format!("installer timed out; partial output: {}", output.stderr.trim()),
            });
        }
        if output.code != 0 {
            return Err(BootstrapError::Install {
                name: handle.name().clone(),
                stderr: output.stderr,
            });
        }
        Ok(())
    }

    /// Names of the environments currently present under the root, sorted.
    /// Presence means the same thing as `exists`: the interpreter is there.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter(|entry| interpreter_in(&entry.path()).is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }

    /// Create (skipped when the environment exists) plus install. The normal
    /// entry point for callers; idempotent end to end.
    pub fn setup(
        &self,
        name: &EnvName,
        requirements: &RequirementSet,
    ) -> Result<EnvHandle, BootstrapError> {
        let handle = if self.exists(name) {
            debug!(env = %name, "environment already present");
            self.handle(name)
        } else {
            self.create(name)?
        };
        self.install(&handle, requirements)?;
        Ok(handle)
    }
}

fn bin_dir_in(dir: &Path) -> PathBuf {
    if cfg!(windows) {
        dir.join("Scripts")
    } else {
        dir.join("bin")
    }
}

fn interpreter_in(dir: &Path) -> PathBuf {
    bin_dir_in(dir).join(if cfg!(windows) { "python.exe" } else { "python" })
}

fn installer_in(dir: &Path) -> PathBuf {
    bin_dir_in(dir).join(if cfg!(windows) { "pip.exe" } else { "pip" })
}
