// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the cache and provenance store.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A successful node result was recorded.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct CacheEntryStored<'a> {
    pub identity: &'a str,
    pub node_id: &'a str,
    pub tool: &'a str,
}

impl Display for CacheEntryStored<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Cached result {} of node '{}' (tool '{}')",
            self.identity, self.node_id, self.tool
        )
    }
}

impl StructuredLog for CacheEntryStored<'_> {
    fn log(&self) {
        tracing::debug!(
            identity = self.identity,
            node_id = self.node_id,
            tool = self.tool,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("cache_store", span_name = name, identity = self.identity)
    }
}

/// An entry references outputs that no longer exist. Treated as a miss.
///
/// # Log Level
/// `warn!` - Self-healing inconsistency
///
/// # Example
/// ```
/// use petflow::observability::messages::cache::CacheEntryStale;
///
/// let msg = CacheEntryStale {
///     identity: "9f2c",
///     node_id: "anat_reference",
///     reason: "output 'reference' is missing",
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct CacheEntryStale<'a> {
    pub identity: &'a str,
    pub node_id: &'a str,
    pub reason: &'a str,
}

impl Display for CacheEntryStale<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Cache entry {} for node '{}' is stale ({}); re-executing",
            self.identity, self.node_id, self.reason
        )
    }
}

impl StructuredLog for CacheEntryStale<'_> {
    fn log(&self) {
        tracing::warn!(
            identity = self.identity,
            node_id = self.node_id,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("cache_stale", span_name = name, identity = self.identity)
    }
}

/// An entry was removed on request.
///
/// # Log Level
/// `info!` - Important operational event
pub struct CacheEntryInvalidated<'a> {
    pub identity: &'a str,
    pub tool: &'a str,
    pub reason: &'a str,
}

impl Display for CacheEntryInvalidated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Invalidated cache entry {} (tool '{}'): {}",
            self.identity, self.tool, self.reason
        )
    }
}

impl StructuredLog for CacheEntryInvalidated<'_> {
    fn log(&self) {
        tracing::info!(
            identity = self.identity,
            tool = self.tool,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("cache_invalidate", span_name = name, identity = self.identity)
    }
}

/// A cache read failed. The engine treats it as a miss.
///
/// # Log Level
/// `warn!` - Self-healing inconsistency
pub struct CacheReadFailed<'a> {
    pub identity: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for CacheReadFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to read cache entry {}; treating as a miss: {}",
            self.identity, self.error
        )
    }
}

impl StructuredLog for CacheReadFailed<'_> {
    fn log(&self) {
        tracing::warn!(identity = self.identity, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("cache_read_failed", span_name = name, identity = self.identity)
    }
}

/// A cache write failed. The node keeps its result; only reuse is lost.
///
/// # Log Level
/// `warn!` - Degraded but correct
pub struct CacheWriteFailed<'a> {
    pub identity: &'a str,
    pub node_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for CacheWriteFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to cache result {} of node '{}': {}",
            self.identity, self.node_id, self.error
        )
    }
}

impl StructuredLog for CacheWriteFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            identity = self.identity,
            node_id = self.node_id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("cache_write_failed", span_name = name, identity = self.identity)
    }
}

/// Outdated entries of one tool were pruned.
///
/// # Log Level
/// `info!` - Important operational event
pub struct CachePruned<'a> {
    pub tool: &'a str,
    pub current_version: &'a str,
    pub removed: usize,
}

impl Display for CachePruned<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pruned {} cache entries of tool '{}' not at version {}",
            self.removed, self.tool, self.current_version
        )
    }
}

impl StructuredLog for CachePruned<'_> {
    fn log(&self) {
        tracing::info!(
            tool = self.tool,
            current_version = self.current_version,
            removed = self.removed,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("cache_prune", span_name = name, tool = self.tool)
    }
}
