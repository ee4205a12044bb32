//! # canon-remap
//!
//! Content-addressed path remapping for build actions.
//!
//! Derived inputs of an action live under configuration-specific output
//! directories. Presenting them to a tool under those names makes otherwise
//! identical actions differ across configurations, so the remapper swaps the
//! configuration segment of every derived input for a per-action token:
//!
//! ```text
//! cfgA/bin/x  (digest 01…)  ->  <nonce>-0/bin/x
//! cfgB/bin/x  (digest 02…)  ->  <nonce>-1/bin/x
//! cfgA/bin/y.o (an output)  ->  out/bin/y.o
//! src/main.c  (a source)    ->  src/main.c
//! ```
//!
//! The nonce is derived from the action's input contents, ranks come from
//! digest order, and a missing digest turns the whole action back into the
//! identity mapping. [`PathMapper::materialize`] can publish the virtual
//! layout as a symlink tree for tools that open their inputs by path.
//!
//! ## Usage
//!
//! ```ignore
//! use canon_remap::{Remapper, NoExpansion};
//!
//! let remapper = Remapper::from_config(&canon_config::config())?;
//! let mapper = remapper.build(&requirements, &NoExpansion, Some(&digests), &inputs);
//! let argv = mapper.rewrite_args(&argv, &outputs);
//! mapper.materialize(exec_root)?;
//! ```

pub mod artifact;
pub mod capability;
pub mod diagnostics;
pub mod mapper;
pub mod materialize;
pub mod nonce;
pub mod policy;
pub mod resolver;
pub mod restriction;

pub use artifact::{Artifact, ArtifactKind, Digest, ExecPath};
pub use capability::{AggregateTable, ArtifactExpander, DigestTable, MetadataProvider, NoExpansion};
pub use diagnostics::{Diagnostic, DiagnosticSink, MemorySink, TracingSink};
pub use mapper::{runfiles_path, PathMapper, PathMapping, Remapper};
pub use materialize::{FsOp, MaterializeFs, StdFs};
pub use policy::{decide, ExecutionRequirements};
pub use resolver::ExecPathMapping;
pub use restriction::{restrict, Restriction};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Malformed exec path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("exec path is empty")]
    Empty,

    #[error("exec path must be relative: {0}")]
    Absolute(String),

    #[error("invalid segment {segment:?} in exec path {path}")]
    BadSegment { path: String, segment: String },
}

/// Digest lookup failure. Never fatal: the action keeps its original paths.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("no metadata for {0}")]
    Missing(String),
}

/// Filesystem failure while publishing the virtual tree; fatal to the action.
#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("failed to {op} {}: {source}", .path.display())]
    Io {
        op: FsOp,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The virtual path lies below a published link, so creating it would
    /// write into the real artifact tree.
    #[error("cannot materialize {} below linked directory {}", .path.display(), .ancestor.display())]
    Overlap { path: PathBuf, ancestor: PathBuf },
}

/// A restriction that would not be invertible.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestrictionError {
    #[error("{first} and {second} both map to {mapped}")]
    NotInjective {
        first: String,
        second: String,
        mapped: String,
    },
}
