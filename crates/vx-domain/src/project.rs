//! Project-root discovery for caller scripts.

use std::path::{Path, PathBuf};

/// Markers that indicate the top of a project checkout.
const ROOT_MARKERS: [&str; 3] = [".git", "pyproject.toml", "requirements.txt"];

/// Walks upward from the script's directory until a project marker is found.
/// Falls back to the script's own directory when nothing matches, so every
/// script has a well-defined enclosing project.
#[must_use]
pub fn discover_project_root(script: &Path) -> PathBuf {
    let start = script.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let mut dir = start.clone();
    loop {
        if ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()) {
            return dir;
        }
        if !dir.pop() {
            break;
        }
    }
    start
}
