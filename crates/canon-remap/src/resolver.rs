//! Collision resolution: assigns every derived input a content-addressed
//! virtual path.
//!
//! Inputs are grouped by root-relative path. Within a group, members are
//! ranked by digest (unsigned bytes), ties broken by the original path, and
//! the configuration segment is replaced with `<nonce>-<rank>`. Every derived
//! input is renamed, whether or not its group actually collides.

use std::collections::{BTreeMap, BTreeSet};

use canon_config::RemapSettings;

use crate::artifact::{Artifact, Digest, ExecPath};
use crate::capability::{ArtifactExpander, MetadataProvider};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::nonce::NonceBuilder;

/// Original exec path → virtual path for one action's derived inputs.
///
/// Keys and values are each unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecPathMapping {
    nonce: String,
    entries: BTreeMap<ExecPath, ExecPath>,
}

impl ExecPathMapping {
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn get(&self, original: &ExecPath) -> Option<&ExecPath> {
        self.entries.get(original)
    }

    /// Entries in original-path order.
    pub fn iter(&self) -> impl Iterator<Item = (&ExecPath, &ExecPath)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Replace every aggregate with the leaves it expands to.
///
/// Nested aggregates are expanded too; an aggregate reached twice is
/// expanded once.
pub(crate) fn expand_inputs(inputs: &[Artifact], expander: &dyn ArtifactExpander) -> Vec<Artifact> {
    let mut leaves = Vec::with_capacity(inputs.len());
    let mut seen_aggregates = BTreeSet::new();
    let mut pending: Vec<Artifact> = inputs.iter().rev().cloned().collect();

    while let Some(artifact) = pending.pop() {
        if artifact.is_aggregate() {
            if seen_aggregates.insert(artifact.exec_path().clone()) {
                pending.extend(expander.expand(&artifact).into_iter().rev());
            }
        } else {
            leaves.push(artifact);
        }
    }
    leaves
}

/// Build the mapping for one action, or `None` if any derived input cannot
/// be fingerprinted.
pub(crate) fn resolve(
    inputs: &[Artifact],
    expander: &dyn ArtifactExpander,
    metadata: &dyn MetadataProvider,
    settings: &RemapSettings,
    sink: &dyn DiagnosticSink,
) -> Option<ExecPathMapping> {
    let index = settings.config_segment;

    let mut derived: BTreeMap<ExecPath, Artifact> = BTreeMap::new();
    for leaf in expand_inputs(inputs, expander) {
        if leaf.is_source() {
            sink.emit(Diagnostic::SkippedSource {
                path: leaf.exec_path().to_string(),
            });
            continue;
        }
        derived.entry(leaf.exec_path().clone()).or_insert(leaf);
    }

    // Phase 1: fingerprint and bucket by root-relative path.
    let mut nonce = NonceBuilder::new();
    let mut groups: BTreeMap<String, Vec<(Digest, ExecPath)>> = BTreeMap::new();
    for (exec_path, artifact) in &derived {
        let Some(root_relative) = artifact.root_relative_path(index) else {
            sink.emit(Diagnostic::MalformedDerivedPath {
                path: exec_path.to_string(),
            });
            return None;
        };

        let digest = match metadata.digest_of(artifact) {
            Ok(digest) => digest,
            Err(e) => {
                sink.emit(Diagnostic::MetadataUnavailable {
                    path: exec_path.to_string(),
                    reason: e.to_string(),
                });
                return None;
            }
        };
        if !digest.is_usable() {
            sink.emit(Diagnostic::UnusableDigest {
                path: exec_path.to_string(),
            });
            return None;
        }

        nonce.add(&root_relative, &digest);
        groups
            .entry(root_relative)
            .or_default()
            .push((digest, exec_path.clone()));
    }
    let nonce = nonce.finish(settings.nonce_len);

    // Phase 2: rank each bucket by digest and rename.
    let mut entries = BTreeMap::new();
    for members in groups.values_mut() {
        members.sort_by(|(da, pa), (db, pb)| da.cmp(db).then_with(|| pa.cmp(pb)));
        for (rank, (_, original)) in members.iter().enumerate() {
            let token = format!("{}-{}", nonce, rank);
            let Some(virtual_path) = original.with_segment(index, &token) else {
                sink.emit(Diagnostic::MalformedDerivedPath {
                    path: original.to_string(),
                });
                return None;
            };
            sink.emit(Diagnostic::Remapped {
                from: original.to_string(),
                to: virtual_path.to_string(),
            });
            entries.insert(original.clone(), virtual_path);
        }
    }

    sink.emit(Diagnostic::MappingBuilt {
        nonce: nonce.clone(),
        entries: entries.len(),
    });
    Some(ExecPathMapping { nonce, entries })
}
