//! Materialization of the virtual input tree.
//!
//! Each virtual path becomes a relative symlink back to the real artifact.
//! Links are created under a unique temporary name next to their final
//! location and renamed into place, so a concurrent reader sees either no
//! entry or a complete link. Nothing is ever created below a path that is
//! already a link, since that would write into the real artifact tree.
//!
//! ```text
//! <exec_root>/
//! ├── cfgA/bin/x                      # real artifact
//! └── <nonce>-0/bin/x -> ../../cfgA/bin/x
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::artifact::ExecPath;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::resolver::ExecPathMapping;
use crate::MaterializeError;

// ============================================================================
// Filesystem capability
// ============================================================================

/// Filesystem operations the materializer needs.
pub trait MaterializeFs: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create `link` pointing at the relative `target`.
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Atomically replace `to` with `from`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Whether `path` itself is a symlink; missing paths are not.
    fn is_symlink(&self, path: &Path) -> bool;

    /// Name of this backend, reported with every link diagnostic.
    fn name(&self) -> &'static str;
}

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

impl MaterializeFs for StdFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(not(unix))]
    fn symlink(&self, _target: &Path, _link: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "symlink materialization requires a Unix host",
        ))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "std"
    }
}

/// Which filesystem step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    CreateDir,
    Symlink,
    Rename,
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FsOp::CreateDir => "create directory",
            FsOp::Symlink => "create symlink",
            FsOp::Rename => "rename into place",
        })
    }
}

// ============================================================================
// Link layout
// ============================================================================

/// Target of the link at `virtual_path` that resolves to `original`.
///
/// Both are exec-root-relative, so the link climbs one `..` per directory
/// level of the virtual path and then descends to the original.
pub fn relative_link_target(original: &ExecPath, virtual_path: &ExecPath) -> PathBuf {
    let depth = virtual_path.segment_count() - 1;
    let mut target = PathBuf::new();
    for _ in 0..depth {
        target.push("..");
    }
    target.push(original.as_str());
    target
}

fn temp_link_path(link: &Path) -> PathBuf {
    let name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    link.with_file_name(format!("{}.{}.tmp", name, uuid::Uuid::new_v4()))
}

// ============================================================================
// Materialization
// ============================================================================

/// How an entry relates to the other virtual paths of its mapping.
#[derive(Debug, PartialEq, Eq)]
enum Placement<'a> {
    /// No other virtual path is an ancestor; the entry gets its own link.
    Own,
    /// An ancestor's link already resolves to this entry's original.
    Covered { ancestor: &'a ExecPath },
    /// An ancestor's link resolves somewhere else.
    Conflict { ancestor: &'a ExecPath },
}

/// Classify `virtual_path` against the mapping's other virtual paths.
///
/// `by_virtual` maps each virtual path to its original.
fn placement<'a>(
    original: &ExecPath,
    virtual_path: &ExecPath,
    by_virtual: &HashMap<&str, (&'a ExecPath, &'a ExecPath)>,
) -> Placement<'a> {
    let segments: Vec<&str> = virtual_path.segments().collect();
    for depth in 1..segments.len() {
        let prefix = segments[..depth].join("/");
        let Some(&(ancestor_original, ancestor_virtual)) = by_virtual.get(prefix.as_str()) else {
            continue;
        };
        let rest = segments[depth..].join("/");
        if original.as_str() == format!("{}/{}", ancestor_original, rest) {
            return Placement::Covered {
                ancestor: ancestor_virtual,
            };
        }
        return Placement::Conflict {
            ancestor: ancestor_virtual,
        };
    }
    Placement::Own
}

/// Publish a link for every entry of `mapping` under `exec_root`.
///
/// An entry whose virtual path lies below another entry's link, and which
/// that link already reaches, gets no link of its own. Stops at the first
/// failure. Returns the number of links published.
pub fn materialize_mapping(
    mapping: &ExecPathMapping,
    exec_root: &Path,
    fs: &dyn MaterializeFs,
    sink: &dyn DiagnosticSink,
) -> Result<usize, MaterializeError> {
    let by_virtual: HashMap<&str, (&ExecPath, &ExecPath)> = mapping
        .iter()
        .map(|(original, virtual_path)| (virtual_path.as_str(), (original, virtual_path)))
        .collect();

    let mut published = 0;
    for (original, virtual_path) in mapping.iter() {
        let result = match placement(original, virtual_path, &by_virtual) {
            Placement::Own => publish_link(original, virtual_path, exec_root, fs),
            Placement::Covered { ancestor } => {
                sink.emit(Diagnostic::LinkCovered {
                    path: virtual_path.to_string(),
                    ancestor: ancestor.to_string(),
                });
                continue;
            }
            Placement::Conflict { ancestor } => Err(MaterializeError::Overlap {
                path: exec_root.join(virtual_path.as_str()),
                ancestor: exec_root.join(ancestor.as_str()),
            }),
        };

        if let Err(e) = result {
            sink.emit(Diagnostic::MaterializeFailed {
                path: virtual_path.to_string(),
                reason: e.to_string(),
                backend: fs.name(),
            });
            return Err(e);
        }
        sink.emit(Diagnostic::LinkPublished {
            link: virtual_path.to_string(),
            target: original.to_string(),
            backend: fs.name(),
        });
        published += 1;
    }
    Ok(published)
}

/// Refuse to create anything below an existing link, including links left
/// by an earlier materialization.
fn ensure_no_linked_ancestor(
    virtual_path: &ExecPath,
    exec_root: &Path,
    fs: &dyn MaterializeFs,
) -> Result<(), MaterializeError> {
    let mut dir = exec_root.to_path_buf();
    let depth = virtual_path.segment_count() - 1;
    for segment in virtual_path.segments().take(depth) {
        dir.push(segment);
        if fs.is_symlink(&dir) {
            return Err(MaterializeError::Overlap {
                path: exec_root.join(virtual_path.as_str()),
                ancestor: dir,
            });
        }
    }
    Ok(())
}

fn publish_link(
    original: &ExecPath,
    virtual_path: &ExecPath,
    exec_root: &Path,
    fs: &dyn MaterializeFs,
) -> Result<(), MaterializeError> {
    let link = exec_root.join(virtual_path.as_str());
    let fail = |op: FsOp, path: &Path, source: io::Error| MaterializeError::Io {
        op,
        path: path.to_path_buf(),
        source,
    };

    ensure_no_linked_ancestor(virtual_path, exec_root, fs)?;

    if let Some(parent) = link.parent() {
        fs.create_dir_all(parent)
            .map_err(|e| fail(FsOp::CreateDir, parent, e))?;
    }

    let target = relative_link_target(original, virtual_path);
    let temp = temp_link_path(&link);
    fs.symlink(&target, &temp)
        .map_err(|e| fail(FsOp::Symlink, &temp, e))?;

    if let Err(e) = fs.rename(&temp, &link) {
        // Clean up orphaned temp link if rename failed
        let _ = fs.remove_file(&temp);
        return Err(fail(FsOp::Rename, &link, e));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
