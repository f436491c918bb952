//! Caller-declared package requirements.

use serde::{Deserialize, Serialize};

/// Ordered requirement strings, handed to the installer verbatim.
///
/// No deduplication or version-conflict resolution happens here; whatever
/// the installer accepts, this accepts. Blank entries are dropped because
/// they would otherwise become empty installer arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementSet(Vec<String>);

impl RequirementSet {
    #[must_use]
    pub fn new(specs: Vec<String>) -> Self {
        Self(
            specs
                .into_iter()
                .map(|spec| spec.trim().to_string())
                .filter(|spec| !spec.is_empty())
                .collect(),
        )
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

impl From<Vec<String>> for RequirementSet {
    fn from(specs: Vec<String>) -> Self {
        Self::new(specs)
    }
}

impl<'a> IntoIterator for &'a RequirementSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
