//! The auto-relaunch controller.
//!
//! A restart-based state machine, not recursion: the original invocation
//! either proves it is already provisioned, or it provisions the environment
//! and re-executes itself inside it exactly once, marked so the relaunched
//! invocation short-circuits. Modeled as an explicit three-state machine so
//! the single-relaunch guarantee is testable on its own.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};
use vx_domain::{compute_identity, discover_project_root, EnvName, RequirementSet};

use crate::core::envs::{EnvHandle, EnvStore};
use crate::core::errors::BootstrapError;

/// Sentinel appended to a relaunched invocation's argument list. No
/// legitimate caller argument collides with it by accident.
pub const RELAUNCH_MARKER: &str = "__vx-relaunch__";

/// Lifecycle of one invocation through the controller. `Relaunched` is
/// terminal: the original process is replaced (or exits with the child's
/// code) after entering it; the relaunched process starts over at
/// `Unchecked` with the marker present, which forces it straight to
/// `Provisioned`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unchecked,
    Provisioned,
    Relaunched,
}

/// The current process invocation as the controller sees it.
#[derive(Clone, Debug)]
pub struct Invocation {
    pub script: PathBuf,
    pub args: Vec<String>,
    /// Resolved executable of the interpreter currently hosting the
    /// invocation, when one can be determined.
    pub interpreter: Option<PathBuf>,
}

impl Invocation {
    #[must_use]
    pub fn new(script: PathBuf, args: Vec<String>) -> Self {
        Self {
            script,
            args,
            interpreter: None,
        }
    }

    #[must_use]
    pub fn with_interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.interpreter = interpreter;
        self
    }

    fn carries_marker(&self) -> bool {
        self.args.iter().any(|arg| arg == RELAUNCH_MARKER)
    }
}

/// Why an invocation counts as provisioned without a relaunch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionedReason {
    /// The relaunch marker was present: this invocation is the result of a
    /// prior relaunch and is trusted without re-verification.
    Marker,
    /// The invocation already runs under the environment's own interpreter.
    InsideEnv,
}

/// Outcome of the pure decision step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    AlreadyProvisioned(ProvisionedReason),
    Relaunch,
}

/// Returned to the caller when no relaunch is needed; normal execution may
/// proceed past the bootstrap checkpoint.
#[derive(Debug)]
pub struct Provisioned {
    pub handle: EnvHandle,
    pub reason: ProvisionedReason,
}

pub struct AutoRelaunch<'a> {
    store: &'a EnvStore,
    name: EnvName,
    phase: Phase,
}

impl<'a> AutoRelaunch<'a> {
    /// Binds the controller to the environment identity of `script`: the
    /// override name when given, otherwise the identity derived from the
    /// script and its discovered project root.
    #[must_use]
    pub fn new(store: &'a EnvStore, script: &Path, override_name: Option<&str>) -> Self {
        let script = script.canonicalize().unwrap_or_else(|_| script.to_path_buf());
        let name = match override_name {
            Some(raw) => EnvName::custom(raw),
            None => compute_identity(&script, &discover_project_root(&script)),
        };
        Self {
            store,
            name,
            phase: Phase::Unchecked,
        }
    }

    #[must_use]
    pub fn name(&self) -> &EnvName {
        &self.name
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The decision step, free of side effects on the store.
    ///
    /// Order matters: the marker is checked first and trusted
    /// unconditionally, which is what bounds every invocation chain at one
    /// relaunch. Interpreter comparison handles the marker-less case of a
    /// user invoking the environment's interpreter by hand.
    #[must_use]
    pub fn decide(&self, invocation: &Invocation) -> Decision {
        if invocation.carries_marker() {
            return Decision::AlreadyProvisioned(ProvisionedReason::Marker);
        }
        if self.store.exists(&self.name) {
            if let Some(current) = &invocation.interpreter {
                if same_executable(current, &self.store.interpreter_path(&self.name)) {
                    return Decision::AlreadyProvisioned(ProvisionedReason::InsideEnv);
                }
            }
        }
        Decision::Relaunch
    }

    /// Ensures the invocation runs provisioned.
    ///
    /// Returns `Ok` only when the current invocation may simply continue.
    /// On the relaunch path this function does not return on success: the
    /// process is replaced by (or exits with the code of) the relaunched
    /// invocation. Any failure before the relaunch command is issued is
    /// reported to the caller and no relaunch happens.
    pub fn auto_switch(
        &mut self,
        invocation: &Invocation,
        requirements: &RequirementSet,
    ) -> Result<Provisioned, BootstrapError> {
        match self.decide(invocation) {
            Decision::AlreadyProvisioned(reason) => {
                self.phase = Phase::Provisioned;
                debug!(env = %self.name, ?reason, "invocation already provisioned");
                Ok(Provisioned {
                    handle: self.store.handle(&self.name),
                    reason,
                })
            }
            Decision::Relaunch => {
                let handle = self.store.setup(&self.name, requirements)?;
                self.phase = Phase::Relaunched;
                info!(
                    env = %self.name,
                    script = %invocation.script.display(),
                    "relaunching inside environment"
                );
                Err(launch(
                    command_for(&handle, &invocation.script, &invocation.args, true),
                    &handle,
                ))
            }
        }
    }
}

/// Executes `script` under the environment's interpreter with activation
/// environment applied. Diverges on success; returns the spawn error
/// otherwise. Used after a `Provisioned` verdict, when the current process
/// hands off to the script without another provisioning pass.
pub fn exec_script(handle: &EnvHandle, script: &Path, args: &[String]) -> BootstrapError {
    launch(command_for(handle, script, args, false), handle)
}

fn command_for(handle: &EnvHandle, script: &Path, args: &[String], append_marker: bool) -> Command {
    let mut command = Command::new(handle.interpreter());
    command.arg(script);
    command.args(args);
    if append_marker {
        command.arg(RELAUNCH_MARKER);
    }
    // Standard venv activation semantics: the child sees VIRTUAL_ENV and the
    // environment's bin directory first on PATH. Working directory and the
    // rest of the environment are inherited untouched.
    command.env("VIRTUAL_ENV", handle.dir());
    command.env("PATH", path_with_env_bin(handle.bin_dir()));
    command
}

fn path_with_env_bin(bin_dir: PathBuf) -> OsString {
    match env::var_os("PATH") {
        Some(existing) => {
            let mut paths = vec![bin_dir];
            paths.extend(env::split_paths(&existing));
            env::join_paths(paths).unwrap_or(existing)
        }
        None => bin_dir.into_os_string(),
    }
}

#[cfg(unix)]
fn launch(mut command: Command, handle: &EnvHandle) -> BootstrapError {
    use std::os::unix::process::CommandExt;
    // exec only returns on failure.
    let err = command.exec();
    spawn_error(handle, &err)
}

#[cfg(not(unix))]
fn launch(mut command: Command, handle: &EnvHandle) -> BootstrapError {
    match command.status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(-1)),
        Err(err) => spawn_error(handle, &err),
    }
}

fn spawn_error(handle: &EnvHandle, err: &std::io::Error) -> BootstrapError {
    BootstrapError::Spawn {
        name: handle.name().clone(),
        interpreter: handle.interpreter(),
        detail: err.to_string(),
    }
}

/// Whether two interpreter paths point into the same environment.
///
/// The containing directories are resolved, not the executables: venv
/// interpreters are symlinks to a shared base Python, so resolving the file
/// itself would make every environment created from that base look
/// identical.
fn same_executable(left: &Path, right: &Path) -> bool {
    let resolve_dir = |path: &Path| path.parent().and_then(|dir| dir.canonicalize().ok());
    match (resolve_dir(left), resolve_dir(right)) {
        (Some(left_dir), Some(right_dir)) => left_dir == right_dir,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{Config, EnvSnapshot, ENVS_DIR_ENV, PYTHON_ENV};
    use std::fs;

    fn empty_store(temp: &tempfile::TempDir) -> EnvStore {
        let root = temp.path().join("envs");
        let snapshot = EnvSnapshot::testing(&[
            (ENVS_DIR_ENV, root.to_str().expect("utf8")),
            (PYTHON_ENV, "/nonexistent/python3"),
        ]);
        EnvStore::new(&Config::from_snapshot(&snapshot).expect("config"))
    }

    fn plant_interpreter(store: &EnvStore, name: &EnvName) -> PathBuf {
        let interpreter = store.interpreter_path(name);
        fs::create_dir_all(interpreter.parent().expect("bin dir")).expect("create bin dir");
        fs::write(&interpreter, "").expect("write interpreter");
        interpreter
    }

    #[test]
    fn marker_is_trusted_even_when_environment_is_gone() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = empty_store(&temp);
        let script = temp.path().join("tool.py");
        fs::write(&script, "print('hi')\n").expect("write script");

        // Simulates the relaunched invocation after someone deleted the
        // environment: exists() is false, but the marker must still win —
        // this is what bounds the chain at a single relaunch.
        let invocation = Invocation::new(
            script.clone(),
            vec!["--flag".into(), RELAUNCH_MARKER.into()],
        );
        let mut controller = AutoRelaunch::new(&store, &script, None);
        assert_eq!(controller.phase(), Phase::Unchecked);

        let provisioned = controller
            .auto_switch(&invocation, &RequirementSet::default())
            .expect("marker short-circuits");
        assert_eq!(provisioned.reason, ProvisionedReason::Marker);
        assert_eq!(controller.phase(), Phase::Provisioned);
    }

    #[test]
    fn running_interpreter_inside_env_short_circuits_without_marker() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = empty_store(&temp);
        let script = temp.path().join("tool.py");
        fs::write(&script, "").expect("write script");

        let controller = AutoRelaunch::new(&store, &script, None);
        let interpreter = plant_interpreter(&store, controller.name());

        let invocation =
            Invocation::new(script.clone(), vec![]).with_interpreter(Some(interpreter));
        assert_eq!(
            controller.decide(&invocation),
            Decision::AlreadyProvisioned(ProvisionedReason::InsideEnv)
        );
    }

    #[test]
    fn foreign_interpreter_still_relaunches() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = empty_store(&temp);
        let script = temp.path().join("tool.py");
        fs::write(&script, "").expect("write script");

        let controller = AutoRelaunch::new(&store, &script, None);
        plant_interpreter(&store, controller.name());

        let foreign = temp.path().join("python3");
        fs::write(&foreign, "").expect("write foreign interpreter");
        let invocation = Invocation::new(script.clone(), vec![]).with_interpreter(Some(foreign));
        assert_eq!(controller.decide(&invocation), Decision::Relaunch);
    }

    #[test]
    fn missing_environment_decides_relaunch() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = empty_store(&temp);
        let script = temp.path().join("tool.py");
        fs::write(&script, "").expect("write script");

        let controller = AutoRelaunch::new(&store, &script, None);
        let invocation = Invocation::new(script.clone(), vec!["a".into(), "b".into()]);
        assert_eq!(controller.decide(&invocation), Decision::Relaunch);
    }

    #[test]
    fn setup_failure_is_fail_closed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = empty_store(&temp);
        let script = temp.path().join("tool.py");
        fs::write(&script, "").expect("write script");

        let mut controller = AutoRelaunch::new(&store, &script, None);
        let invocation = Invocation::new(script.clone(), vec![]);
        let err = controller
            .auto_switch(&invocation, &RequirementSet::default())
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Creation { .. }));
        // No relaunch was issued: the failure happened before the terminal
        // transition.
        assert_eq!(controller.phase(), Phase::Unchecked);
    }

    #[test]
    fn override_name_replaces_derived_identity() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = empty_store(&temp);
        let script = temp.path().join("tool.py");
        fs::write(&script, "").expect("write script");

        let derived = AutoRelaunch::new(&store, &script, None);
        let named = AutoRelaunch::new(&store, &script, Some("shared-env"));
        assert_ne!(derived.name(), named.name());
        assert_eq!(named.name().as_str(), "shared-env");
    }

    #[test]
    fn identity_is_stable_across_controllers() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = empty_store(&temp);
        let script = temp.path().join("tool.py");
        fs::write(&script, "").expect("write script");

        let first = AutoRelaunch::new(&store, &script, None);
        let second = AutoRelaunch::new(&store, &script, None);
        assert_eq!(first.name(), second.name());
    }
}
