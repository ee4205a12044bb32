//! Per-action enablement of path remapping.

use std::collections::BTreeSet;

use canon_config::RequirementKeys;
use serde::{Deserialize, Serialize};

/// String flags an action declares about how its tool must be run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionRequirements(BTreeSet<String>);

impl ExecutionRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, flag: impl Into<String>) {
        self.0.insert(flag.into());
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.0.contains(flag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ExecutionRequirements {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Why an action keeps its original paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disabled {
    /// No metadata capability is available to digest inputs.
    NoMetadata,
    /// The action does not declare support for remapped paths.
    NotSupported,
}

impl Disabled {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disabled::NoMetadata => "no metadata capability",
            Disabled::NotSupported => "action does not support path remapping",
        }
    }
}

/// Check whether to remap an action's paths, reporting why not.
pub fn check(
    requirements: &ExecutionRequirements,
    keys: &RequirementKeys,
    has_metadata: bool,
) -> Result<(), Disabled> {
    if !has_metadata {
        return Err(Disabled::NoMetadata);
    }
    if !requirements.contains(&keys.supports_remapping) {
        return Err(Disabled::NotSupported);
    }
    Ok(())
}

/// Decide whether to remap an action's paths.
pub fn decide(
    requirements: &ExecutionRequirements,
    keys: &RequirementKeys,
    has_metadata: bool,
) -> bool {
    check(requirements, keys, has_metadata).is_ok()
}

/// Whether the action's tool must see virtual paths on disk.
pub fn wants_materialized_inputs(
    requirements: &ExecutionRequirements,
    keys: &RequirementKeys,
) -> bool {
    requirements.contains(&keys.materialize_inputs)
}
