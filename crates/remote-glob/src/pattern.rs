//! Parsed path patterns with globstar (`**`) support.
//!
//! A pattern is split on `/` into segments, each one of:
//!
//! - `card.ttl`: a literal name
//! - `*.ttl`, `note?`, `[ab]*`: a single-level wildcard
//! - `**`: zero or more whole path levels
//!
//! `a/**/z` therefore matches `a/z`, `a/b/z` and `a/b/c/z`.

use thiserror::Error;

use crate::glob::{contains_glob, glob_match};

/// Errors when parsing patterns.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("empty pattern")]
    Empty,
    #[error("invalid pattern: {0}")]
    Invalid(String),
}

/// One `/`-separated piece of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Exact member name: "photos", "card.ttl"
    Literal(String),
    /// Name with glob metacharacters: "*.ttl", "note?"
    Wildcard(String),
    /// Zero or more path levels
    GlobStar,
}

impl Segment {
    pub fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }
}

/// A parsed, immutable path pattern.
///
/// # Examples
/// ```
/// use remote_glob::{Pattern, Segment};
///
/// let pattern = Pattern::parse("/data/**/*.ttl").unwrap();
/// assert_eq!(pattern.segments()[0], Segment::Literal("data".into()));
/// assert_eq!(pattern.segments()[1], Segment::GlobStar);
/// assert!(pattern.matches("data/a/b/x.ttl"));
/// assert!(!pattern.matches("data/x.jsonld"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse a pattern. A leading `/` is optional; patterns are always
    /// resolved against the traversal root.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();

        for part in pattern.split('/') {
            match part {
                "" | "." => continue,
                ".." => {
                    return Err(PatternError::Invalid(format!(
                        "parent references are not supported: {pattern}"
                    )));
                }
                "**" => {
                    if segments.last() != Some(&Segment::GlobStar) {
                        segments.push(Segment::GlobStar);
                    }
                }
                _ if contains_glob(part) => segments.push(Segment::Wildcard(part.to_string())),
                _ => segments.push(Segment::Literal(part.to_string())),
            }
        }

        if segments.is_empty() {
            return Err(PatternError::Empty);
        }

        Ok(Pattern {
            source: pattern.to_string(),
            segments,
        })
    }

    /// The text this pattern was parsed from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True if any segment needs a listing to resolve.
    pub fn has_magic(&self) -> bool {
        !self.segments.iter().all(Segment::is_literal)
    }

    /// Leading literal segments joined with `/`, if any.
    ///
    /// ```
    /// use remote_glob::Pattern;
    ///
    /// assert_eq!(Pattern::parse("a/b/*.ttl").unwrap().static_prefix().as_deref(), Some("a/b"));
    /// assert_eq!(Pattern::parse("**/x").unwrap().static_prefix(), None);
    /// ```
    pub fn static_prefix(&self) -> Option<String> {
        let literals: Vec<&str> = self
            .segments
            .iter()
            .map_while(|seg| match seg {
                Segment::Literal(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();

        (!literals.is_empty()).then(|| literals.join("/"))
    }

    /// Check a concrete, root-relative path against the pattern.
    pub fn matches(&self, path: &str) -> bool {
        let components: Vec<&str> = path
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .collect();
        matches_from(&self.segments, &components)
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::parse(s)
    }
}

fn matches_from(segments: &[Segment], components: &[&str]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return components.is_empty();
    };

    match first {
        Segment::GlobStar => (0..=components.len()).any(|skip| matches_from(rest, &components[skip..])),
        Segment::Literal(lit) => {
            components.first() == Some(&lit.as_str()) && matches_from(rest, &components[1..])
        }
        Segment::Wildcard(pat) => components
            .first()
            .is_some_and(|c| glob_match(pat, c) && matches_from(rest, &components[1..])),
    }
}
