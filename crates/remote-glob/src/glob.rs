//! Single-segment glob matching.
//!
//! Matches one path component (a member name returned by a listing) against
//! one pattern segment:
//! - `*` matches zero or more characters, never a `/`
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` match any character in the set or range
//! - `[!abc]` or `[^abc]` match any character NOT in the set
//! - `\x` matches `x` literally
//!
//! Brace expansion is deliberately absent: remote patterns arrive inside URL
//! paths where `{` and `}` are ordinary characters.
//!
//! The matcher keeps a single restart point for the most recent `*`, so it
//! runs in O(pattern × name) time no matter how many stars the pattern has.

/// Check if a segment contains glob metacharacters (`*`, `?`, `[`).
///
/// ```
/// use remote_glob::contains_glob;
/// assert!(contains_glob("*.ttl"));
/// assert!(contains_glob("photo[0-9]"));
/// assert!(!contains_glob("profile"));
/// ```
pub fn contains_glob(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

/// Match a single name against a single-segment glob pattern.
///
/// Returns true if the pattern matches the entire name.
///
/// # Examples
/// ```
/// use remote_glob::glob_match;
///
/// assert!(glob_match("*.ttl", "card.ttl"));
/// assert!(glob_match("note?", "note1"));
/// assert!(glob_match("[abc]", "b"));
/// assert!(!glob_match("*.ttl", "card.jsonld"));
/// ```
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = name.chars().collect();

    let mut p = 0;
    let mut t = 0;
    // (pattern index just past the last `*`, text index that star resumes from)
    let mut restart: Option<(usize, usize)> = None;

    while t < text.len() {
        match step(&pat, p, text[t]) {
            Step::Star => {
                restart = Some((p + 1, t));
                p += 1;
                continue;
            }
            Step::Advance(next) => {
                p = next;
                t += 1;
                continue;
            }
            Step::Mismatch => {}
        }

        match restart {
            // A star never swallows a separator.
            Some((after_star, from)) if text[from] != '/' => {
                restart = Some((after_star, from + 1));
                p = after_star;
                t = from + 1;
            }
            _ => return false,
        }
    }

    pat[p.min(pat.len())..].iter().all(|&c| c == '*')
}

enum Step {
    Star,
    Advance(usize),
    Mismatch,
}

/// Try to consume one text character `c` at pattern position `p`.
fn step(pat: &[char], p: usize, c: char) -> Step {
    let Some(&pc) = pat.get(p) else {
        return Step::Mismatch;
    };

    match pc {
        '*' => Step::Star,
        '?' if c != '/' => Step::Advance(p + 1),
        '?' => Step::Mismatch,
        '[' => match class_matches(pat, p, c) {
            Some((true, end)) => Step::Advance(end),
            Some((false, _)) => Step::Mismatch,
            // Unclosed bracket is an ordinary character.
            None if c == '[' => Step::Advance(p + 1),
            None => Step::Mismatch,
        },
        '\\' if p + 1 < pat.len() => {
            if pat[p + 1] == c {
                Step::Advance(p + 2)
            } else {
                Step::Mismatch
            }
        }
        lit if lit == c => Step::Advance(p + 1),
        _ => Step::Mismatch,
    }
}

/// Evaluate the character class opening at `pat[start]` against `c`.
///
/// Returns `(matched, index past the closing bracket)`, or `None` when the
/// class is never closed.
fn class_matches(pat: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negated = matches!(pat.get(i), Some('!' | '^'));
    if negated {
        i += 1;
    }

    // `]` directly after the opening (or the negation) is a member, not the end.
    let first = i;
    let mut hit = false;

    while i < pat.len() {
        let lo = pat[i];
        if lo == ']' && i > first {
            return Some((hit != negated, i + 1));
        }

        let range_hi = match (pat.get(i + 1), pat.get(i + 2)) {
            (Some('-'), Some(&hi)) if hi != ']' => Some(hi),
            _ => None,
        };

        match range_hi {
            Some(hi) => {
                hit |= lo <= c && c <= hi;
                i += 3;
            }
            None => {
                hit |= lo == c;
                i += 1;
            }
        }
    }

    None
}
