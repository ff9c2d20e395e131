//! Absolute path helpers.
//!
//! Remote paths are plain strings, not `std::path::Path`: they come out of
//! URLs and must behave the same on every platform. The normalized form is
//! the identity used for cache and coalescing keys.

/// The namespace root.
pub const ROOT: &str = "/";

/// Normalize a path: leading `/`, no trailing `/` (except the root), no empty
/// or `.` components.
///
/// ```
/// use remote_glob::path::normalize;
/// assert_eq!(normalize("a//b/./c/"), "/a/b/c");
/// assert_eq!(normalize(""), "/");
/// ```
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
        out.push('/');
        out.push_str(part);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Append one component to a normalized directory path.
pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// The last component of a normalized path (empty for the root).
pub fn name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

/// Strip the leading `/`, giving a name relative to the root.
pub fn relative(path: &str) -> &str {
    path.trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes() {
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("a"), "/a");
        assert_eq!(normalize("/a/b/"), "/a/b");
        assert_eq!(normalize("//a/./b"), "/a/b");
    }

    #[test]
    fn joins_and_names() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
        assert_eq!(name("/a/b"), "b");
        assert_eq!(name("/"), "");
        assert_eq!(relative("/a/b"), "a/b");
    }
}
