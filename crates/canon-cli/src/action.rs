//! Action description files.
//!
//! ```json
//! {
//!   "requirements": ["supports-path-remapping"],
//!   "inputs": [
//!     { "path": "cfgA/bin/x", "kind": "derived", "digest": "01ab..." },
//!     { "path": "src/main.c", "kind": "source" },
//!     { "path": "cfgA/bin/deps", "kind": "aggregate", "members": [ ... ] }
//!   ],
//!   "outputs": ["cfgA/bin/out.o"],
//!   "args": ["-o", "cfgA/bin/out.o", "cfgA/bin/x"]
//! }
//! ```
//!
//! A derived input without a digest has no metadata, which turns the whole
//! action back into the identity mapping.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use canon_remap::{
    AggregateTable, Artifact, ArtifactKind, Digest, DigestTable, ExecPath, ExecutionRequirements,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(default)]
    pub requirements: ExecutionRequirements,

    #[serde(default)]
    pub inputs: Vec<InputSpec>,

    /// Paths this action writes; they take the output literal in `args`.
    #[serde(default)]
    pub outputs: Vec<ExecPath>,

    /// Command line to rewrite with the mapping.
    #[serde(default)]
    pub args: Vec<String>,

    /// Whether digests may be consulted at all.
    #[serde(default = "default_true")]
    pub metadata: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    pub path: ExecPath,

    #[serde(default = "default_kind")]
    pub kind: ArtifactKind,

    /// Hex-encoded content digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<InputSpec>,
}

fn default_true() -> bool {
    true
}

fn default_kind() -> ArtifactKind {
    ArtifactKind::Derived
}

/// Inputs of an action in the form the remapper consumes.
#[derive(Debug, Default)]
pub struct ActionInputs {
    pub artifacts: Vec<Artifact>,
    pub aggregates: AggregateTable,
    pub digests: DigestTable,
}

impl ActionSpec {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read action file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid action file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Flatten the input tree into top-level artifacts plus lookup tables.
    pub fn inputs(&self) -> Result<ActionInputs> {
        let mut out = ActionInputs::default();
        for input in &self.inputs {
            let artifact = flatten_input(input, &mut out)?;
            out.artifacts.push(artifact);
        }
        Ok(out)
    }
}

fn flatten_input(input: &InputSpec, out: &mut ActionInputs) -> Result<Artifact> {
    let artifact = Artifact::new(input.path.clone(), input.kind);

    if let Some(hex_digest) = &input.digest {
        let digest = Digest::from_hex(hex_digest)
            .with_context(|| format!("Invalid digest for {}", input.path))?;
        out.digests.insert(input.path.clone(), digest);
    }

    if input.kind == ArtifactKind::Aggregate {
        let members = input
            .members
            .iter()
            .map(|member| flatten_input(member, out))
            .collect::<Result<Vec<_>>>()?;
        out.aggregates.insert(input.path.clone(), members);
    } else if !input.members.is_empty() {
        anyhow::bail!("{} has members but is not an aggregate", input.path);
    }

    Ok(artifact)
}
