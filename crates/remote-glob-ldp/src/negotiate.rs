//! `Accept` header negotiation.
//!
//! Ranks a requester's acceptable media types against the types we can
//! produce, RFC 2616 style:
//!
//! - a missing or blank header means `*/*`
//! - entries are split on `,` and parameters on `;`, ignoring separators
//!   inside double quotes
//! - every provided type is scored against its most specific matching entry
//!   (type = 4, subtype = 2, parameters = 1)
//! - results sort by quality, then specificity, then header position, then
//!   provided position; quality 0 means "not acceptable"
//!
//! A `q` value that is not a number parses as `NaN`. Such entries stay
//! acceptable but always rank last.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static MEDIA_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([^\s/;]+)/([^;\s]+)\s*(?:;(.*))?$").expect("media type pattern compiles")
});

/// One parsed `type/subtype;params` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaType {
    pub main_type: String,
    pub subtype: String,
    /// Lowercased keys, unquoted values. Parameters after `q` are not kept.
    pub params: BTreeMap<String, String>,
    /// Quality, 1.0 when absent.
    pub q: f64,
    /// Position in the list it was parsed from.
    pub index: usize,
}

impl MediaType {
    /// Parse a single media type. Returns `None` if it is not `type/subtype`.
    pub fn parse(s: &str, index: usize) -> Option<Self> {
        let caps = MEDIA_TYPE.captures(s)?;
        let mut params = BTreeMap::new();
        let mut q = 1.0;

        if let Some(rest) = caps.get(3) {
            for param in split_quoted(rest.as_str(), ';') {
                let (key, value) = match param.split_once('=') {
                    Some((k, v)) => (k.trim().to_ascii_lowercase(), unquote(v.trim())),
                    None => (param.trim().to_ascii_lowercase(), String::new()),
                };

                if key == "q" {
                    q = parse_quality(&value);
                    break;
                }
                params.insert(key, value);
            }
        }

        Some(MediaType {
            main_type: caps[1].to_string(),
            subtype: caps[2].to_string(),
            params,
            q,
            index,
        })
    }

    /// `type/subtype`, without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main_type, self.subtype)
    }

    /// Specificity of `self` (a header entry) against a provided type, or
    /// `None` if the entry does not accept it.
    fn specificity(&self, provided: &MediaType) -> Option<u8> {
        let mut s = 0;

        if self.main_type.eq_ignore_ascii_case(&provided.main_type) {
            s |= 4;
        } else if self.main_type != "*" {
            return None;
        }

        if self.subtype.eq_ignore_ascii_case(&provided.subtype) {
            s |= 2;
        } else if self.subtype != "*" {
            return None;
        }

        if !self.params.is_empty() {
            let all_match = self.params.iter().all(|(key, want)| {
                let have = provided.params.get(key).map(String::as_str).unwrap_or_default();
                want == "*" || want.to_lowercase() == have.to_lowercase()
            });
            if !all_match {
                return None;
            }
            s |= 1;
        }

        Some(s)
    }
}

/// How well one provided type is accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Priority {
    pub q: f64,
    pub specificity: u8,
    /// Index of the header entry that matched.
    pub entry: usize,
    /// Index of the provided type.
    pub candidate: usize,
}

impl Priority {
    fn acceptable(&self) -> bool {
        // NaN is kept on purpose; it sorts last instead.
        !(self.q <= 0.0)
    }

    /// Most preferred first.
    fn rank(&self, other: &Self) -> Ordering {
        compare_quality(other.q, self.q)
            .then_with(|| other.specificity.cmp(&self.specificity))
            .then_with(|| self.entry.cmp(&other.entry))
            .then_with(|| self.candidate.cmp(&other.candidate))
    }
}

/// Parse an `Accept` header into its entries, in header order.
///
/// Entries that are not `type/subtype` are skipped but still count for
/// positions.
pub fn parse_accept(accept: Option<&str>) -> Vec<MediaType> {
    let header = match accept {
        Some(h) if !h.trim().is_empty() => h,
        _ => "*/*",
    };

    split_quoted(header, ',')
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| MediaType::parse(entry.trim(), i))
        .collect()
}

/// The subset of `provided` that `accept` allows, most preferred first.
///
/// # Examples
/// ```
/// use remote_glob_ldp::negotiate::preferred_media_types;
///
/// let provided = ["text/turtle", "application/ld+json"];
/// let ranked = preferred_media_types(Some("text/*;q=0.5, application/ld+json;q=0.9"), &provided);
/// assert_eq!(ranked, vec!["application/ld+json", "text/turtle"]);
///
/// assert!(preferred_media_types(Some("text/html"), &["text/turtle"]).is_empty());
/// ```
pub fn preferred_media_types<S: AsRef<str>>(accept: Option<&str>, provided: &[S]) -> Vec<String> {
    let accepted = parse_accept(accept);

    let mut ranked: Vec<Priority> = provided
        .iter()
        .enumerate()
        .filter_map(|(i, candidate)| priority(candidate.as_ref(), i, &accepted))
        .filter(Priority::acceptable)
        .collect();
    ranked.sort_by(Priority::rank);

    ranked
        .into_iter()
        .map(|p| provided[p.candidate].as_ref().to_string())
        .collect()
}

/// The single most preferred provided type, if any is acceptable.
pub fn preferred_media_type<S: AsRef<str>>(accept: Option<&str>, provided: &[S]) -> Option<String> {
    preferred_media_types(accept, provided).into_iter().next()
}

/// Every type the header itself accepts, most preferred first.
///
/// This is the answer when there is no provided set to choose from.
pub fn accepted_media_types(accept: Option<&str>) -> Vec<String> {
    let mut accepted: Vec<MediaType> = parse_accept(accept)
        .into_iter()
        .filter(|m| !(m.q <= 0.0))
        .collect();
    accepted.sort_by(|a, b| compare_quality(b.q, a.q).then_with(|| a.index.cmp(&b.index)));
    accepted.iter().map(MediaType::essence).collect()
}

/// Best header entry for one provided type: most specific, then highest
/// quality, then latest.
fn priority(candidate: &str, index: usize, accepted: &[MediaType]) -> Option<Priority> {
    let provided = MediaType::parse(candidate, index)?;
    let mut best: Option<Priority> = None;

    for entry in accepted {
        let Some(specificity) = entry.specificity(&provided) else {
            continue;
        };
        let current = Priority {
            q: entry.q,
            specificity,
            entry: entry.index,
            candidate: index,
        };

        let better = match &best {
            None => true,
            Some(b) => specificity
                .cmp(&b.specificity)
                .then_with(|| compare_quality(current.q, b.q))
                .then_with(|| current.entry.cmp(&b.entry))
                .is_gt(),
        };
        if better {
            best = Some(current);
        }
    }

    best
}

/// Total order on qualities with `NaN` below everything.
fn compare_quality(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Parse the longest leading decimal number, `NaN` if there is none.
fn parse_quality(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let digits = |from: usize| bytes[from..].iter().take_while(|b| b.is_ascii_digit()).count();

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let whole = digits(end);
    end += whole;

    let mut fraction = 0;
    if bytes.get(end) == Some(&b'.') {
        fraction = digits(end + 1);
        if whole > 0 || fraction > 0 {
            end += 1 + fraction;
        }
    }
    if whole == 0 && fraction == 0 {
        return f64::NAN;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
        let exp = digits(end + 1 + sign);
        if exp > 0 {
            end += 1 + sign + exp;
        }
    }

    s[..end].parse().unwrap_or(f64::NAN)
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

/// Split on `sep` except inside double quotes.
pub(crate) fn split_quoted(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in s.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c == sep && !quoted => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}
