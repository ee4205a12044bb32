//! Diagnostics emitted while building and materializing a mapping.
//!
//! The resolver and materializer report through a [`DiagnosticSink`] handed
//! to them rather than logging globally. [`TracingSink`] forwards to the
//! component-tagged `tracing` macros; [`MemorySink`] keeps events for tests.

use std::sync::Mutex;

use canon_config::{
    log_materialize_debug, log_materialize_error, log_remap_debug, log_remap_info, log_remap_warn,
};

/// A single observable event of the remapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Remapping is off for this action; every path stays as-is.
    Disabled { reason: &'static str },
    /// A source input was left out of remapping.
    SkippedSource { path: String },
    /// Digest lookup failed; the whole action falls back to identity.
    MetadataUnavailable { path: String, reason: String },
    /// The digest was empty; the whole action falls back to identity.
    UnusableDigest { path: String },
    /// A derived input has no configuration segment to replace.
    MalformedDerivedPath { path: String },
    /// An input was assigned its virtual path.
    Remapped { from: String, to: String },
    /// The per-action mapping is complete.
    MappingBuilt { nonce: String, entries: usize },
    /// Opaque tool arguments were passed through without rewriting.
    CustomArgsUnchanged { count: usize },
    /// A virtual path now links to its real location.
    LinkPublished {
        link: String,
        target: String,
        backend: &'static str,
    },
    /// A virtual path is already reachable through an ancestor's link.
    LinkCovered { path: String, ancestor: String },
    /// Materialization stopped at this path.
    MaterializeFailed {
        path: String,
        reason: String,
        backend: &'static str,
    },
}

/// Receiver of remapper diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::Disabled { reason } => {
                log_remap_debug!("Path remapping disabled", reason = reason);
            }
            Diagnostic::SkippedSource { path } => {
                log_remap_debug!("Skipping source artifact", path = path.as_str());
            }
            Diagnostic::MetadataUnavailable { path, reason } => {
                log_remap_warn!(
                    "Error getting metadata, keeping original paths",
                    path = path.as_str(),
                    error = reason.as_str()
                );
            }
            Diagnostic::UnusableDigest { path } => {
                log_remap_warn!("Got empty digest, keeping original paths", path = path.as_str());
            }
            Diagnostic::MalformedDerivedPath { path } => {
                log_remap_warn!(
                    "Derived artifact has no configuration segment, keeping original paths",
                    path = path.as_str()
                );
            }
            Diagnostic::Remapped { from, to } => {
                log_remap_debug!("Remapping", from = from.as_str(), to = to.as_str());
            }
            Diagnostic::MappingBuilt { nonce, entries } => {
                log_remap_info!(
                    "Built path mapping",
                    nonce = nonce.as_str(),
                    entries = entries as u64
                );
            }
            Diagnostic::CustomArgsUnchanged { count } => {
                log_remap_warn!("Custom arguments are not remapped", count = count as u64);
            }
            Diagnostic::LinkPublished {
                link,
                target,
                backend,
            } => {
                log_materialize_debug!(
                    "Published link",
                    link = link.as_str(),
                    points_to = target.as_str(),
                    backend = backend
                );
            }
            Diagnostic::LinkCovered { path, ancestor } => {
                log_materialize_debug!(
                    "Virtual path reached through ancestor link",
                    path = path.as_str(),
                    ancestor = ancestor.as_str()
                );
            }
            Diagnostic::MaterializeFailed {
                path,
                reason,
                backend,
            } => {
                log_materialize_error!(
                    "Failed to materialize virtual path",
                    path = path.as_str(),
                    error = reason.as_str(),
                    backend = backend
                );
            }
        }
    }
}

/// Records diagnostics in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Drain recorded events.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(
            &mut *self
                .events
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, diagnostic: Diagnostic) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.emit(Diagnostic::SkippedSource {
            path: "src/a.c".to_string(),
        });
        sink.emit(Diagnostic::CustomArgsUnchanged { count: 2 });

        let events = sink.take();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Diagnostic::SkippedSource { .. }));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_tracing_sink_accepts_every_variant() {
        let sink = TracingSink;
        sink.emit(Diagnostic::Disabled { reason: "test" });
        sink.emit(Diagnostic::MappingBuilt {
            nonce: "abc".to_string(),
            entries: 0,
        });
        sink.emit(Diagnostic::MaterializeFailed {
            path: "x".to_string(),
            reason: "denied".to_string(),
            backend: "std",
        });
        sink.emit(Diagnostic::LinkCovered {
            path: "n-0/bin/dir/f".to_string(),
            ancestor: "n-0/bin/dir".to_string(),
        });
    }
}
