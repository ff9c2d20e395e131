//! remote-glob: Glob expansion over namespaces you can only reach remotely.
//!
//! Provides:
//! - **glob_match**: Single-segment shell-style matching (`*`, `?`, `[...]`)
//! - **Pattern**: A parsed path pattern with `**` (globstar) segments
//! - **TraversalState**: Per-expansion cache and request coalescer
//! - **RemoteGlob**: Async pattern expansion, generic over `RemoteFs`
//!
//! Listing a directory and statting a path are network round-trips here, not
//! system calls. Consumers implement `RemoteFs` with two capabilities, `list`
//! and `probe`, and the engine does the rest: it walks the pattern segment by
//! segment, runs sibling branches concurrently, and never issues the same
//! call twice within one expansion.

pub mod cache;
pub mod glob;
pub mod path;
mod pattern;
mod walker;

pub use cache::{OpKind, TraversalState};
pub use glob::{contains_glob, glob_match};
pub use pattern::{Pattern, PatternError, Segment};
pub use walker::{GlobOptions, RemoteGlob, expand};

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a `RemoteFs` implementation.
///
/// `NotFound` is the 4xx-class signal: the engine treats it as "this branch
/// contributes nothing" and keeps going. Everything else is fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FsError {
    /// True for the absorbed, per-branch "absent or forbidden" signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }
}

/// Errors that abort a whole expansion.
#[derive(Debug, Clone, Error)]
pub enum TraversalError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("failed to read {path}: {source}")]
    Fs {
        path: String,
        #[source]
        source: FsError,
    },
}

/// What a lightweight existence probe learned about a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Probe {
    Absent,
    File,
    Directory,
}

impl Probe {
    pub fn exists(self) -> bool {
        !matches!(self, Probe::Absent)
    }

    pub fn is_dir(self) -> bool {
        matches!(self, Probe::Directory)
    }
}

/// Minimal read-only view of a remote namespace.
///
/// Paths are absolute, normalized with [`path::normalize`], and rooted at the
/// namespace root (`/`). Implement this trait to adapt a transport to
/// `RemoteGlob`; the engine handles caching and coalescing on top.
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// List the member names of a directory-like path.
    ///
    /// Return an empty listing for paths that exist but are not directories,
    /// and `FsError::NotFound` for paths the remote reports as absent.
    async fn list(&self, path: &str) -> Result<Vec<String>, FsError>;

    /// Classify a path without fetching its children.
    async fn probe(&self, path: &str) -> Result<Probe, FsError>;

    /// Return the identity of the directory a path really names.
    ///
    /// Used for globstar cycle detection: two paths that canonicalize to the
    /// same string are descended only once. Remotes that expose aliases
    /// (redirects, link-like members) should resolve them here. The default
    /// returns the path unchanged.
    async fn canonicalize(&self, path: &str) -> String {
        path.to_string()
    }
}

#[async_trait]
impl<F: RemoteFs + ?Sized> RemoteFs for &F {
    async fn list(&self, path: &str) -> Result<Vec<String>, FsError> {
        (**self).list(path).await
    }

    async fn probe(&self, path: &str) -> Result<Probe, FsError> {
        (**self).probe(path).await
    }

    async fn canonicalize(&self, path: &str) -> String {
        (**self).canonicalize(path).await
    }
}

#[async_trait]
impl<F: RemoteFs + ?Sized> RemoteFs for std::sync::Arc<F> {
    async fn list(&self, path: &str) -> Result<Vec<String>, FsError> {
        (**self).list(path).await
    }

    async fn probe(&self, path: &str) -> Result<Probe, FsError> {
        (**self).probe(path).await
    }

    async fn canonicalize(&self, path: &str) -> String {
        (**self).canonicalize(path).await
    }
}
