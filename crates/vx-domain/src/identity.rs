//! Deterministic environment naming.
//!
//! Every (script, project root) pair maps to exactly one environment name.
//! The name doubles as a directory name, so it only ever contains characters
//! that are legal on every target filesystem. Two different pairs must not
//! map to the same name: an installer pointed at a colliding environment
//! would silently corrupt an unrelated script's dependencies.

use std::fmt;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Hex characters of the pair digest kept in the name.
const DIGEST_CHARS: usize = 10;
/// Upper bound on the sanitized stem, to stay clear of path-length limits.
const MAX_STEM_CHARS: usize = 40;

/// Validated, filesystem-safe environment name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnvName(String);

impl EnvName {
    /// Builds a name from a caller-supplied override instead of the derived
    /// identity. The raw value is sanitized the same way a script stem is.
    pub fn custom(raw: &str) -> Self {
        let mut stem = sanitize_token(raw);
        if stem.is_empty() {
            stem.push_str("env");
        }
        Self(stem)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<EnvName> for String {
    fn from(name: EnvName) -> Self {
        name.0
    }
}

/// Derives the environment name for `script` inside `project_root`.
///
/// The result is `<sanitized stem>-<digest>` where the digest covers both
/// normalized absolute paths. Repeated calls with the same pair yield the
/// same name; the derivation runs identically on every operating system.
#[must_use]
pub fn compute_identity(script: &Path, project_root: &Path) -> EnvName {
    let mut stem = sanitize_token(script_stem(script));
    if stem.is_empty() {
        stem.push_str("script");
    }
    EnvName(format!("{stem}-{}", pair_digest(script, project_root)))
}

fn script_stem(script: &Path) -> &str {
    script
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("script")
}

fn pair_digest(script: &Path, project_root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_path(script).as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_path(project_root).as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(DIGEST_CHARS);
    digest
}

/// Backslash separators are folded to `/` so the digest does not depend on
/// the host's path syntax.
fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn sanitize_token(raw: &str) -> String {
    let mut result = String::new();
    let mut last_was_sep = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_') {
            result.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep && !result.is_empty() {
            result.push('-');
            last_was_sep = true;
        }
        if result.len() == MAX_STEM_CHARS {
            break;
        }
    }
    while result.ends_with('-') {
        result.pop();
    }
    result
}
