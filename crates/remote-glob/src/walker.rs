//! Async pattern expansion over a `RemoteFs`.
//!
//! The pattern is consumed one segment at a time from a frontier that starts
//! at the root. Every frontier entry is an independent branch: branches run
//! concurrently, and a branch the remote reports as absent simply ends.
//! Any other remote failure aborts the whole expansion.

use std::collections::HashSet;

use futures::FutureExt;
use futures::future::{BoxFuture, try_join, try_join_all};

use crate::cache::TraversalState;
use crate::glob::glob_match;
use crate::path::{join, normalize};
use crate::pattern::{Pattern, Segment};
use crate::{FsError, Probe, RemoteFs, TraversalError};

/// Options for pattern expansion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobOptions {
    /// Descend through every listed member under `**` without probing it
    /// first. Members that are not containers list as empty. The visited set
    /// still guards against cycles.
    pub follow: bool,
    /// Let wildcards and `**` match names starting with `.`.
    pub include_hidden: bool,
}

/// Pattern expander, generic over any `RemoteFs` implementation.
///
/// # Examples
/// ```ignore
/// use remote_glob::{GlobOptions, Pattern, RemoteGlob};
///
/// let matches = RemoteGlob::new(&my_remote)
///     .with_options(GlobOptions { follow: true, ..Default::default() })
///     .expand(&Pattern::parse("data/**/*.ttl")?, "/")
///     .await?;
/// ```
pub struct RemoteGlob<'a, F: RemoteFs + ?Sized> {
    fs: &'a F,
    options: GlobOptions,
}

impl<'a, F: RemoteFs + ?Sized> RemoteGlob<'a, F> {
    pub fn new(fs: &'a F) -> Self {
        Self {
            fs,
            options: GlobOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GlobOptions) -> Self {
        self.options = options;
        self
    }

    /// Expand `pattern` below `root` with a fresh `TraversalState`.
    ///
    /// Returns absolute paths, deduplicated. Order follows response arrival
    /// and is only stable within one call.
    pub async fn expand(&self, pattern: &Pattern, root: &str) -> Result<Vec<String>, TraversalError> {
        let state = TraversalState::new();
        self.expand_with_state(pattern, root, &state).await
    }

    /// Expand using a caller-owned state, e.g. to inspect call counts.
    ///
    /// The state must be fresh: reusing one across expansions would serve
    /// stale listings.
    #[tracing::instrument(level = "debug", skip(self, pattern, state), fields(pattern = %pattern), err)]
    pub async fn expand_with_state(
        &self,
        pattern: &Pattern,
        root: &str,
        state: &TraversalState,
    ) -> Result<Vec<String>, TraversalError> {
        let walk = Walk {
            fs: self.fs,
            state,
            segments: pattern.segments(),
            options: self.options,
        };

        let found = walk.step(normalize(root), 0).await?;

        let mut seen = HashSet::with_capacity(found.len());
        let matches: Vec<String> = found.into_iter().filter(|p| seen.insert(p.clone())).collect();

        tracing::debug!(
            matches = matches.len(),
            transport_calls = state.transport_calls(),
            "expansion complete"
        );
        Ok(matches)
    }
}

/// Expand `pattern` below `root` through `fs`.
pub async fn expand<F: RemoteFs + ?Sized>(
    pattern: &Pattern,
    root: &str,
    fs: &F,
    options: GlobOptions,
) -> Result<Vec<String>, TraversalError> {
    RemoteGlob::new(fs).with_options(options).expand(pattern, root).await
}

/// One expansion in progress. Cheap to copy into each branch.
struct Walk<'s, F: RemoteFs + ?Sized> {
    fs: &'s F,
    state: &'s TraversalState,
    segments: &'s [Segment],
    options: GlobOptions,
}

impl<F: RemoteFs + ?Sized> Clone for Walk<'_, F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F: RemoteFs + ?Sized> Copy for Walk<'_, F> {}

type Branch<'s> = BoxFuture<'s, Result<Vec<String>, TraversalError>>;

impl<'s, F: RemoteFs + ?Sized> Walk<'s, F> {
    /// Match `segments[idx..]` starting from `path`.
    fn step(self, path: String, idx: usize) -> Branch<'s> {
        async move {
            let Some(segment) = self.segments.get(idx) else {
                return Ok(vec![path]);
            };
            let last = idx + 1 == self.segments.len();

            match segment {
                Segment::Literal(name) if last => {
                    let child = join(&path, name);
                    let found = self.probe(&child).await?.exists();
                    Ok(if found { vec![child] } else { Vec::new() })
                }
                Segment::Literal(name) => {
                    let Some(names) = self.list(&path).await? else {
                        return Ok(Vec::new());
                    };
                    if !names.iter().any(|n| n == name) {
                        return Ok(Vec::new());
                    }
                    self.step(join(&path, name), idx + 1).await
                }
                Segment::Wildcard(pattern) => {
                    let Some(names) = self.list(&path).await? else {
                        return Ok(Vec::new());
                    };
                    let branches = names
                        .iter()
                        .filter(|n| self.visible(n, pattern) && glob_match(pattern, n))
                        .map(|n| self.step(join(&path, n), idx + 1));
                    flatten(try_join_all(branches).await?)
                }
                Segment::GlobStar => {
                    let key = self.fs.canonicalize(&path).await;
                    if !self.state.mark_visited(idx, &key) {
                        return Ok(Vec::new());
                    }
                    self.globstar(path, idx).await
                }
            }
        }
        .boxed()
    }

    /// `dir` itself plus every directory below it continue with the rest of
    /// the pattern. `dir` is already marked visited.
    fn globstar(self, dir: String, idx: usize) -> Branch<'s> {
        async move {
            let trailing = idx + 1 == self.segments.len();

            let here = self.step(dir.clone(), idx + 1);
            let below = self.members(dir, idx, trailing);

            let (mut found, deeper) = try_join(here, below).await?;
            found.extend(deeper);
            Ok(found)
        }
        .boxed()
    }

    /// Every visible member of a globstar directory, each as its own branch.
    fn members(self, dir: String, idx: usize, trailing: bool) -> Branch<'s> {
        async move {
            let Some(names) = self.list(&dir).await? else {
                return Ok(Vec::new());
            };
            let branches = names
                .iter()
                .filter(|n| self.options.include_hidden || !n.starts_with('.'))
                .map(|n| self.descend(join(&dir, n), idx, trailing));
            flatten(try_join_all(branches).await?)
        }
        .boxed()
    }

    /// One member found under a globstar directory.
    fn descend(self, child: String, idx: usize, trailing: bool) -> Branch<'s> {
        async move {
            let kind = if self.options.follow {
                Probe::Directory
            } else {
                self.probe(&child).await?
            };

            match kind {
                Probe::Absent => Ok(Vec::new()),
                // Files only match when the globstar ends the pattern; other
                // continuations reach them through their parent's listing.
                Probe::File => Ok(if trailing { vec![child] } else { Vec::new() }),
                Probe::Directory => {
                    let key = self.fs.canonicalize(&child).await;
                    if !self.state.mark_visited(idx, &key) {
                        tracing::debug!(path = %child, "already visited, not descending");
                        return Ok(Vec::new());
                    }
                    self.globstar(child, idx).await
                }
            }
        }
        .boxed()
    }

    /// Listing of `path`, or `None` when the remote says it is absent.
    async fn list(self, path: &str) -> Result<Option<Vec<String>>, TraversalError> {
        match self.state.list(self.fs, path).await {
            Ok(names) => Ok(Some(names)),
            Err(err) if err.is_not_found() => {
                tracing::debug!(path, "listing absent, dropping branch");
                Ok(None)
            }
            Err(source) => Err(fatal(path, source)),
        }
    }

    async fn probe(self, path: &str) -> Result<Probe, TraversalError> {
        match self.state.probe(self.fs, path).await {
            Ok(probe) => Ok(probe),
            Err(err) if err.is_not_found() => Ok(Probe::Absent),
            Err(source) => Err(fatal(path, source)),
        }
    }

    /// Hidden names only match when asked for explicitly.
    fn visible(&self, name: &str, pattern: &str) -> bool {
        self.options.include_hidden || !name.starts_with('.') || pattern.starts_with('.')
    }
}

fn fatal(path: &str, source: FsError) -> TraversalError {
    TraversalError::Fs {
        path: path.to_string(),
        source,
    }
}

fn flatten(branches: Vec<Vec<String>>) -> Result<Vec<String>, TraversalError> {
    Ok(branches.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::OpKind;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory remote namespace.
    ///
    /// Directories map to their member names; anything else in `files` is a
    /// file. `links` maps a path to the directory it aliases, and
    /// `canonicalize` resolves them the way a server redirect would.
    #[derive(Default)]
    struct MemoryRemote {
        dirs: HashMap<String, Vec<String>>,
        files: Vec<String>,
        links: HashMap<String, String>,
        forbidden: Vec<String>,
        broken: Vec<String>,
        lists: AtomicUsize,
        probes: AtomicUsize,
        listed: Mutex<Vec<String>>,
    }

    impl MemoryRemote {
        fn dir(mut self, path: &str, members: &[&str]) -> Self {
            self.dirs
                .insert(path.to_string(), members.iter().map(|m| m.to_string()).collect());
            self
        }

        fn file(mut self, path: &str) -> Self {
            self.files.push(path.to_string());
            self
        }

        fn link(mut self, path: &str, target: &str) -> Self {
            self.links.insert(path.to_string(), target.to_string());
            self
        }

        fn forbid(mut self, path: &str) -> Self {
            self.forbidden.push(path.to_string());
            self
        }

        fn broken(mut self, path: &str) -> Self {
            self.broken.push(path.to_string());
            self
        }

        /// Resolve links in every prefix of `path`.
        fn resolve(&self, path: &str) -> String {
            let mut resolved = String::from("/");
            for part in path.split('/').filter(|p| !p.is_empty()) {
                resolved = join(&resolved, part);
                if let Some(target) = self.links.get(&resolved) {
                    resolved = target.clone();
                }
            }
            resolved
        }

        fn check(&self, path: &str) -> Result<(), FsError> {
            if self.broken.iter().any(|p| p == path) {
                return Err(FsError::Transport(format!("500 for {path}")));
            }
            if self.forbidden.iter().any(|p| p == path) {
                return Err(FsError::NotFound(path.to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteFs for MemoryRemote {
        async fn list(&self, path: &str) -> Result<Vec<String>, FsError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.listed.lock().unwrap().push(path.to_string());
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.check(path)?;
            let resolved = self.resolve(path);
            match self.dirs.get(&resolved) {
                Some(members) => Ok(members.clone()),
                None if self.files.contains(&resolved) => Ok(Vec::new()),
                None => Err(FsError::NotFound(path.to_string())),
            }
        }

        async fn probe(&self, path: &str) -> Result<Probe, FsError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.check(path)?;
            let resolved = self.resolve(path);
            Ok(if self.dirs.contains_key(&resolved) {
                Probe::Directory
            } else if self.files.contains(&resolved) {
                Probe::File
            } else {
                Probe::Absent
            })
        }

        async fn canonicalize(&self, path: &str) -> String {
            self.resolve(path)
        }
    }

    fn sample() -> MemoryRemote {
        MemoryRemote::default()
            .dir("/", &["a", "b", ".hidden"])
            .dir("/a", &["x", "y", "notes.ttl"])
            .file("/a/x")
            .file("/a/notes.ttl")
            .dir("/a/y", &["deep.ttl", "z"])
            .file("/a/y/deep.ttl")
            .dir("/a/y/z", &["bottom.ttl"])
            .file("/a/y/z/bottom.ttl")
            .dir("/b", &["card.ttl"])
            .file("/b/card.ttl")
            .dir("/.hidden", &["secret.ttl"])
            .file("/.hidden/secret.ttl")
    }

    async fn run(fs: &MemoryRemote, pattern: &str, options: GlobOptions) -> Vec<String> {
        let pattern = Pattern::parse(pattern).unwrap();
        let mut found = expand(&pattern, "/", fs, options).await.unwrap();
        found.sort();
        found
    }

    #[tokio::test]
    async fn test_wildcard_one_level() {
        let fs = sample();
        assert_eq!(
            run(&fs, "a/*", GlobOptions::default()).await,
            vec!["/a/notes.ttl", "/a/x", "/a/y"]
        );
    }

    #[tokio::test]
    async fn test_final_literal_probes() {
        let fs = sample();
        assert_eq!(run(&fs, "b/card.ttl", GlobOptions::default()).await, vec!["/b/card.ttl"]);
        assert!(run(&fs, "b/missing.ttl", GlobOptions::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_intermediate_literal_uses_listing() {
        let fs = sample();
        assert_eq!(run(&fs, "a/y/*.ttl", GlobOptions::default()).await, vec!["/a/y/deep.ttl"]);
        assert!(run(&fs, "nope/*.ttl", GlobOptions::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_globstar_finds_every_depth() {
        let fs = sample();
        assert_eq!(
            run(&fs, "a/**/*.ttl", GlobOptions::default()).await,
            vec!["/a/notes.ttl", "/a/y/deep.ttl", "/a/y/z/bottom.ttl"]
        );
    }

    #[tokio::test]
    async fn test_trailing_globstar_includes_files_and_dirs() {
        let fs = sample();
        assert_eq!(
            run(&fs, "a/y/**", GlobOptions::default()).await,
            vec!["/a/y", "/a/y/deep.ttl", "/a/y/z", "/a/y/z/bottom.ttl"]
        );
    }

    #[tokio::test]
    async fn test_hidden_names_need_opt_in() {
        let fs = sample();
        assert!(!run(&fs, "**/*.ttl", GlobOptions::default())
            .await
            .contains(&"/.hidden/secret.ttl".to_string()));
        assert_eq!(run(&fs, ".h*/*", GlobOptions::default()).await, vec!["/.hidden/secret.ttl"]);

        let options = GlobOptions {
            include_hidden: true,
            ..Default::default()
        };
        assert!(run(&fs, "**/*.ttl", options)
            .await
            .contains(&"/.hidden/secret.ttl".to_string()));
    }

    #[tokio::test]
    async fn test_absent_branch_is_dropped() {
        let fs = sample().forbid("/a/y");
        assert_eq!(
            run(&fs, "*/*.ttl", GlobOptions::default()).await,
            vec!["/a/notes.ttl", "/b/card.ttl"]
        );
        assert_eq!(
            run(&fs, "a/**/*.ttl", GlobOptions::default()).await,
            vec!["/a/notes.ttl"]
        );
    }

    #[tokio::test]
    async fn test_other_failures_abort() {
        let fs = sample().broken("/b");
        let pattern = Pattern::parse("*/*.ttl").unwrap();
        let err = expand(&pattern, "/", &fs, GlobOptions::default()).await.unwrap_err();
        match err {
            TraversalError::Fs { path, source } => {
                assert_eq!(path, "/b");
                assert!(matches!(source, FsError::Transport(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_each_path_listed_once() {
        let fs = sample();
        let pattern = Pattern::parse("**/*").unwrap();
        let state = TraversalState::new();
        RemoteGlob::new(&fs)
            .expand_with_state(&pattern, "/", &state)
            .await
            .unwrap();

        let listed = fs.listed.lock().unwrap().clone();
        let unique: HashSet<&String> = listed.iter().collect();
        assert_eq!(listed.len(), unique.len(), "duplicate listings: {listed:?}");
        assert_eq!(state.calls(OpKind::List), listed.len());
    }

    #[tokio::test]
    async fn test_link_cycle_terminates() {
        // /loop/back aliases /loop, so following it would recurse forever.
        let fs = MemoryRemote::default()
            .dir("/", &["loop"])
            .dir("/loop", &["back", "item.ttl"])
            .file("/loop/item.ttl")
            .link("/loop/back", "/loop");

        for follow in [false, true] {
            let options = GlobOptions {
                follow,
                ..Default::default()
            };
            let found = run(&fs, "**/*.ttl", options).await;
            assert!(found.contains(&"/loop/item.ttl".to_string()));
            assert!(!found.iter().any(|p| p.starts_with("/loop/back/back")));
        }
    }

    #[tokio::test]
    async fn test_follow_lists_without_probing() {
        let fs = sample();
        let options = GlobOptions {
            follow: true,
            ..Default::default()
        };
        assert_eq!(
            run(&fs, "a/**/*.ttl", options).await,
            vec!["/a/notes.ttl", "/a/y/deep.ttl", "/a/y/z/bottom.ttl"]
        );
        assert_eq!(fs.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeat_expansion_is_idempotent() {
        let fs = sample();
        let first = run(&fs, "**/*.ttl", GlobOptions::default()).await;
        let calls_after_first = fs.lists.load(Ordering::SeqCst);
        let second = run(&fs, "**/*.ttl", GlobOptions::default()).await;
        assert_eq!(first, second);
        // A fresh state per expansion means nothing is served stale.
        assert_eq!(fs.lists.load(Ordering::SeqCst), calls_after_first * 2);
    }
}
