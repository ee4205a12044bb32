//! Artifacts, exec paths and digests as seen by the remapper.
//!
//! An exec path is a relative, slash-separated path under the execution
//! root. One of its segments (index 0 unless configured otherwise) names the
//! configuration-specific output directory; removing it yields the
//! root-relative path that two configurations of the same artifact share.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::PathError;

/// Normalized execution-root-relative path.
///
/// Ordering is byte-lexicographic on the path string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExecPath(String);

impl ExecPath {
    /// Parse a relative path made of non-empty segments.
    pub fn new(path: impl Into<String>) -> Result<Self, PathError> {
        let path = path.into();
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        if path.starts_with('/') {
            return Err(PathError::Absolute(path));
        }
        for segment in path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(PathError::BadSegment {
                    path: path.clone(),
                    segment: segment.to_string(),
                });
            }
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.split('/')
    }

    pub fn segment_count(&self) -> usize {
        self.segments().count()
    }

    /// The path with the segment at `index` removed, joined back with `/`.
    ///
    /// Returns `None` if the path has no segment at `index`.
    pub fn without_segment(&self, index: usize) -> Option<String> {
        if index >= self.segment_count() {
            return None;
        }
        let rest: Vec<&str> = self
            .segments()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, s)| s)
            .collect();
        Some(rest.join("/"))
    }

    /// The path with the segment at `index` replaced by `replacement`.
    ///
    /// Returns `None` if the path has no segment at `index` or if
    /// `replacement` is not a valid single segment.
    pub fn with_segment(&self, index: usize, replacement: &str) -> Option<ExecPath> {
        if index >= self.segment_count()
            || replacement.is_empty()
            || replacement.contains('/')
            || replacement == "."
            || replacement == ".."
        {
            return None;
        }
        let replaced: Vec<&str> = self
            .segments()
            .enumerate()
            .map(|(i, s)| if i == index { replacement } else { s })
            .collect();
        Some(ExecPath(replaced.join("/")))
    }
}

impl fmt::Display for ExecPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ExecPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ExecPath::new(value)
    }
}

impl TryFrom<&str> for ExecPath {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        ExecPath::new(value)
    }
}

impl From<ExecPath> for String {
    fn from(path: ExecPath) -> Self {
        path.0
    }
}

impl AsRef<str> for ExecPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Content digest of an artifact.
///
/// Compared as unsigned bytes, lexicographically, so ordering does not
/// depend on the platform or on how the digest was produced.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(Vec<u8>);

impl Digest {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(hex_str).map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// An empty digest carries no content identity and cannot be ranked.
    pub fn is_usable(&self) -> bool {
        !self.0.is_empty()
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// How an artifact participates in remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Checked-in file; its path is passed through unchanged.
    Source,
    /// Output of an earlier action; eligible for remapping.
    Derived,
    /// Stands for a set of other artifacts and must be expanded.
    Aggregate,
}

/// Read-only view of one action input or output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Artifact {
    exec_path: ExecPath,
    kind: ArtifactKind,
}

impl Artifact {
    pub fn new(exec_path: ExecPath, kind: ArtifactKind) -> Self {
        Self { exec_path, kind }
    }

    pub fn source(exec_path: ExecPath) -> Self {
        Self::new(exec_path, ArtifactKind::Source)
    }

    pub fn derived(exec_path: ExecPath) -> Self {
        Self::new(exec_path, ArtifactKind::Derived)
    }

    pub fn aggregate(exec_path: ExecPath) -> Self {
        Self::new(exec_path, ArtifactKind::Aggregate)
    }

    pub fn exec_path(&self) -> &ExecPath {
        &self.exec_path
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn is_source(&self) -> bool {
        self.kind == ArtifactKind::Source
    }

    pub fn is_aggregate(&self) -> bool {
        self.kind == ArtifactKind::Aggregate
    }

    /// Path with the configuration segment at `config_segment` removed.
    pub fn root_relative_path(&self, config_segment: usize) -> Option<String> {
        self.exec_path.without_segment(config_segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ExecPath {
        ExecPath::new(s).unwrap()
    }

    #[test]
    fn test_rejects_malformed_paths() {
        assert!(matches!(ExecPath::new(""), Err(PathError::Empty)));
        assert!(matches!(ExecPath::new("/abs/x"), Err(PathError::Absolute(_))));
        assert!(matches!(
            ExecPath::new("cfg//x"),
            Err(PathError::BadSegment { .. })
        ));
        assert!(matches!(
            ExecPath::new("cfg/../x"),
            Err(PathError::BadSegment { .. })
        ));
        assert!(matches!(
            ExecPath::new("cfg/x/"),
            Err(PathError::BadSegment { .. })
        ));
    }

    #[test]
    fn test_without_segment() {
        let p = path("cfgA/bin/x");
        assert_eq!(p.without_segment(0).as_deref(), Some("bin/x"));
        assert_eq!(p.without_segment(1).as_deref(), Some("cfgA/x"));
        assert_eq!(p.without_segment(3), None);
        assert_eq!(path("cfgA").without_segment(0).as_deref(), Some(""));
    }

    #[test]
    fn test_with_segment() {
        let p = path("out/k8-opt/bin/pkg/lib.a");
        assert_eq!(
            p.with_segment(1, "run").unwrap().as_str(),
            "out/run/bin/pkg/lib.a"
        );
        assert_eq!(p.with_segment(0, "x").unwrap().as_str(), "x/k8-opt/bin/pkg/lib.a");
        assert!(p.with_segment(5, "x").is_none());
        assert!(p.with_segment(0, "a/b").is_none());
        assert!(p.with_segment(0, "..").is_none());
    }

    #[test]
    fn test_digest_orders_as_unsigned_bytes() {
        let low = Digest::new(vec![0x01, 0xff]);
        let high = Digest::new(vec![0x80, 0x00]);
        // 0x80 would sort first under signed comparison
        assert!(low < high);
        assert!(Digest::new(vec![0x01]) < Digest::new(vec![0x01, 0x00]));
    }

    #[test]
    fn test_digest_hex() {
        let digest = Digest::from_hex("00ff10").unwrap();
        assert_eq!(digest.as_bytes(), &[0x00, 0xff, 0x10]);
        assert_eq!(digest.to_hex(), "00ff10");
        assert!(!Digest::new(Vec::new()).is_usable());
        assert!(Digest::from_hex("zz").is_err());
    }

    #[test]
    fn test_exec_path_serde() {
        let p: ExecPath = serde_json::from_str("\"cfgA/bin/x\"").unwrap();
        assert_eq!(p, path("cfgA/bin/x"));
        assert!(serde_json::from_str::<ExecPath>("\"/etc/passwd\"").is_err());
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"cfgA/bin/x\"");
    }

    #[test]
    fn test_artifact_root_relative() {
        let a = Artifact::derived(path("cfgB/bin/x"));
        assert_eq!(a.root_relative_path(0).as_deref(), Some("bin/x"));
        assert!(!a.is_source());
        assert!(Artifact::source(path("src/main.c")).is_source());
    }
}
