use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use which::which;

use crate::core::config::PYTHON_ENV;

/// Locates the interpreter used to create new environments.
///
/// # Errors
///
/// Returns an error when no interpreter can be found on `PATH` and no
/// override is set.
pub fn detect_base_interpreter(explicit: Option<&str>) -> Result<PathBuf> {
    if let Some(explicit) = explicit {
        let path = PathBuf::from(explicit);
        if !path.is_file() {
            return Err(anyhow!(
                "{PYTHON_ENV} points at {explicit}, which does not exist"
            ));
        }
        return Ok(path);
    }

    for candidate in ["python3", "python"] {
        if let Ok(path) = which(candidate) {
            return Ok(path);
        }
    }

    bail!("no python interpreter found on PATH; set {PYTHON_ENV}")
}

/// The interpreter the current invocation reaches first on `PATH`. Inside an
/// activated environment this is the environment's own interpreter, which is
/// what the relaunch decision compares against. `None` when no interpreter
/// is reachable; the decision then falls through to provisioning.
#[must_use]
pub fn current_interpreter() -> Option<PathBuf> {
    ["python3", "python"]
        .iter()
        .find_map(|candidate| which(candidate).ok())
}
