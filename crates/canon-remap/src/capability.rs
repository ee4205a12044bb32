//! Capabilities the remapper consumes from the action graph.

use std::collections::HashMap;

use crate::artifact::{Artifact, Digest, ExecPath};
use crate::MetadataError;

/// Expands an aggregate artifact into the artifacts it stands for.
pub trait ArtifactExpander {
    fn expand(&self, aggregate: &Artifact) -> Vec<Artifact>;
}

impl<F> ArtifactExpander for F
where
    F: Fn(&Artifact) -> Vec<Artifact>,
{
    fn expand(&self, aggregate: &Artifact) -> Vec<Artifact> {
        self(aggregate)
    }
}

/// Expander for actions without aggregate inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExpansion;

impl ArtifactExpander for NoExpansion {
    fn expand(&self, _aggregate: &Artifact) -> Vec<Artifact> {
        Vec::new()
    }
}

/// Looks up the content digest of an artifact.
pub trait MetadataProvider {
    fn digest_of(&self, artifact: &Artifact) -> Result<Digest, MetadataError>;
}

impl<F> MetadataProvider for F
where
    F: Fn(&Artifact) -> Result<Digest, MetadataError>,
{
    fn digest_of(&self, artifact: &Artifact) -> Result<Digest, MetadataError> {
        self(artifact)
    }
}

/// Expander backed by an explicit aggregate → members table.
#[derive(Debug, Clone, Default)]
pub struct AggregateTable {
    members: HashMap<ExecPath, Vec<Artifact>>,
}

impl AggregateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, aggregate: ExecPath, members: Vec<Artifact>) {
        self.members.insert(aggregate, members);
    }
}

impl ArtifactExpander for AggregateTable {
    fn expand(&self, aggregate: &Artifact) -> Vec<Artifact> {
        self.members
            .get(aggregate.exec_path())
            .cloned()
            .unwrap_or_default()
    }
}

/// Metadata provider backed by a precomputed digest table.
#[derive(Debug, Clone, Default)]
pub struct DigestTable {
    digests: HashMap<ExecPath, Digest>,
}

impl DigestTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: ExecPath, digest: Digest) {
        self.digests.insert(path, digest);
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

impl FromIterator<(ExecPath, Digest)> for DigestTable {
    fn from_iter<I: IntoIterator<Item = (ExecPath, Digest)>>(iter: I) -> Self {
        Self {
            digests: iter.into_iter().collect(),
        }
    }
}

impl MetadataProvider for DigestTable {
    fn digest_of(&self, artifact: &Artifact) -> Result<Digest, MetadataError> {
        self.digests
            .get(artifact.exec_path())
            .cloned()
            .ok_or_else(|| MetadataError::Missing(artifact.exec_path().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ExecPath {
        ExecPath::new(s).unwrap()
    }

    #[test]
    fn test_closure_expander() {
        let expander = |a: &Artifact| vec![Artifact::derived(a.exec_path().clone())];
        let leaves = expander.expand(&Artifact::aggregate(path("cfg/bin/all")));
        assert_eq!(leaves, vec![Artifact::derived(path("cfg/bin/all"))]);
    }

    #[test]
    fn test_closure_metadata_provider() {
        let provider = |a: &Artifact| {
            if a.exec_path().as_str().ends_with(".o") {
                Ok(Digest::new(vec![7]))
            } else {
                Err(MetadataError::Missing(a.exec_path().to_string()))
            }
        };
        assert_eq!(
            provider
                .digest_of(&Artifact::derived(path("cfg/bin/a.o")))
                .unwrap()
                .as_bytes(),
            &[7]
        );
        assert_eq!(
            provider.digest_of(&Artifact::derived(path("cfg/bin/a.h"))),
            Err(MetadataError::Missing("cfg/bin/a.h".to_string()))
        );
    }

    #[test]
    fn test_aggregate_table_unknown_is_empty() {
        let mut table = AggregateTable::new();
        table.insert(
            path("cfg/bin/deps"),
            vec![Artifact::derived(path("cfg/bin/a.o"))],
        );
        assert_eq!(
            table.expand(&Artifact::aggregate(path("cfg/bin/deps"))).len(),
            1
        );
        assert!(table
            .expand(&Artifact::aggregate(path("cfg/bin/other")))
            .is_empty());
    }

    #[test]
    fn test_digest_table_miss_is_error() {
        let table: DigestTable = [(path("cfg/bin/a.o"), Digest::new(vec![1]))]
            .into_iter()
            .collect();
        assert!(table
            .digest_of(&Artifact::derived(path("cfg/bin/a.o")))
            .is_ok());
        assert!(matches!(
            table.digest_of(&Artifact::derived(path("cfg/bin/b.o"))),
            Err(MetadataError::Missing(_))
        ));
    }
}
