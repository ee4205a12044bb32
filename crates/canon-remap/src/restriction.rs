//! Two-way view of a path mapping over an explicit set of paths.

use std::collections::HashMap;

use crate::artifact::ExecPath;
use crate::mapper::PathMapping;
use crate::RestrictionError;

/// Forward and inverse lookup tables built together.
///
/// Only paths given at construction are known; every other lookup is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Restriction {
    forward: HashMap<ExecPath, ExecPath>,
    inverse: HashMap<ExecPath, ExecPath>,
}

impl Restriction {
    pub fn apply(&self, path: &ExecPath) -> Option<&ExecPath> {
        self.forward.get(path)
    }

    pub fn apply_inverse(&self, mapped: &ExecPath) -> Option<&ExecPath> {
        self.inverse.get(mapped)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Evaluate `mapping` at each of `paths` and keep both directions.
///
/// A path listed twice is recorded once. Two different paths with the same
/// image cannot be inverted and are rejected.
pub fn restrict<M, I>(mapping: &M, paths: I) -> Result<Restriction, RestrictionError>
where
    M: PathMapping + ?Sized,
    I: IntoIterator<Item = ExecPath>,
{
    let mut restriction = Restriction::default();
    for path in paths {
        if restriction.forward.contains_key(&path) {
            continue;
        }
        let mapped = mapping.map_path(&path);
        if let Some(existing) = restriction.inverse.get(&mapped) {
            return Err(RestrictionError::NotInjective {
                first: existing.to_string(),
                second: path.to_string(),
                mapped: mapped.to_string(),
            });
        }
        restriction.inverse.insert(mapped.clone(), path.clone());
        restriction.forward.insert(path, mapped);
    }
    Ok(restriction)
}
