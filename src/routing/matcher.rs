//! Path matching logic.
//!
//! # Responsibilities
//! - Segment-wise prefix matching for controller mounts
//! - Glob matching for authorization rules and route tables
//!
//! # Design Decisions
//! - Prefixes match whole segments: `/a` covers `/a` and `/a/b`, not `/ab`
//! - Globs are case-insensitive; `*` stays within a segment, `**` crosses `/`
//! - `;` separates alternative patterns, `{a,b}` expands inline
//! - A trailing `/` on a pattern means "everything below"
//! - No regex, matching is a plain recursive walk

/// Trait for matching request paths.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if `path` is covered by this matcher.
    fn matches(&self, path: &str) -> bool;
}

/// Matches a mount prefix on segment boundaries.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new prefix matcher. Trailing slashes are ignored.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_end_matches('/');
        let prefix = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Part of `path` below the prefix, always starting with `/`.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        if !self.matches(path) {
            return None;
        }
        if self.prefix == "/" {
            return Some(path);
        }
        let rest = &path[self.prefix.len().min(path.len())..];
        Some(if rest.is_empty() { "/" } else { rest })
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" || self.prefix.is_empty() {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    alternatives: Vec<String>,
}

impl GlobMatcher {
    /// Compile `pattern`; an alternative ending in `/` covers the whole subtree.
    pub fn new(pattern: &str) -> Self {
        Self::compile(pattern, true)
    }

    /// Compile `pattern` without the trailing-`/` subtree rule, so `/`
    /// matches the root path only.
    pub fn strict(pattern: &str) -> Self {
        Self::compile(pattern, false)
    }

    fn compile(pattern: &str, subtree: bool) -> Self {
        let mut alternatives = Vec::new();
        for part in pattern.split(';') {
            let part = if subtree && part.ends_with('/') {
                format!("{}**", part)
            } else {
                part.to_string()
            };
            expand_groups(&part, &mut alternatives);
        }
        Self { alternatives }
    }
}

impl Matcher for GlobMatcher {
    fn matches(&self, path: &str) -> bool {
        let name = path.as_bytes();
        self.alternatives
            .iter()
            .any(|alt| glob_bytes(alt.as_bytes(), name))
    }
}

/// One-shot glob test.
pub fn glob_match(path: &str, pattern: &str) -> bool {
    GlobMatcher::new(pattern).matches(path)
}

/// Expand the first `{a,b,...}` group recursively.
fn expand_groups(pattern: &str, out: &mut Vec<String>) {
    let group = pattern.find('{').and_then(|open| {
        pattern[open..]
            .find('}')
            .map(|close| (open, open + close))
            .filter(|&(o, c)| pattern[o + 1..c].contains(',') && !pattern[o + 1..c].contains('{'))
    });

    match group {
        Some((open, close)) => {
            for option in pattern[open + 1..close].split(',') {
                let candidate = format!("{}{}{}", &pattern[..open], option, &pattern[close + 1..]);
                expand_groups(&candidate, out);
            }
        }
        None => out.push(pattern.to_string()),
    }
}

fn glob_bytes(pattern: &[u8], name: &[u8]) -> bool {
    match pattern.first() {
        None => name.is_empty(),
        Some(b'*') => {
            if pattern.get(1) == Some(&b'*') {
                let rest = &pattern[2..];
                if rest.is_empty() {
                    return true;
                }
                // "**/" may also match zero directories
                if rest.first() == Some(&b'/') && glob_bytes(&rest[1..], name) {
                    return true;
                }
                (0..=name.len()).any(|i| glob_bytes(rest, &name[i..]))
            } else {
                let rest = &pattern[1..];
                for i in 0..=name.len() {
                    if glob_bytes(rest, &name[i..]) {
                        return true;
                    }
                    if name.get(i) == Some(&b'/') {
                        return false;
                    }
                }
                false
            }
        }
        Some(b'?') => !name.is_empty() && glob_bytes(&pattern[1..], &name[1..]),
        Some(&op) => match name.first() {
            Some(&c) if c.eq_ignore_ascii_case(&op) => glob_bytes(&pattern[1..], &name[1..]),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_matcher_segments() {
        let matcher = PathPrefixMatcher::new("/a");
        assert!(matcher.matches("/a"));
        assert!(matcher.matches("/a/b"));
        assert!(!matcher.matches("/ab"));
        assert!(!matcher.matches("/"));
        assert_eq!(matcher.strip("/a/b/c"), Some("/b/c"));
        assert_eq!(matcher.strip("/a"), Some("/"));

        let root = PathPrefixMatcher::new("/");
        assert!(root.matches("/anything/at/all"));
        assert_eq!(PathPrefixMatcher::new("api/").prefix(), "/api");
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        assert!(glob_match("/admin/x", "/admin/*"));
        assert!(!glob_match("/admin/x/y", "/admin/*"));
        assert!(glob_match("/public", "/*"));
        assert!(!glob_match("/a/b", "/*"));
        assert!(glob_match("/img/logo.png", "/img/*.png"));
    }

    #[test]
    fn test_double_star_crosses_segments() {
        assert!(glob_match("/a/b/c", "/a/**"));
        assert!(glob_match("/a/c", "/a/**/c"));
        assert!(glob_match("/a/x/y/c", "/a/**/c"));
        assert!(glob_match("/css/deep/site.css", "/css/"));
    }

    #[test]
    fn test_alternatives_and_groups() {
        assert!(glob_match("/login", "/login;/logout"));
        assert!(glob_match("/logout", "/login;/logout"));
        assert!(glob_match("/scripts/app.js", "/{css,scripts}/*"));
        assert!(!glob_match("/fonts/app.js", "/{css,scripts}/*"));
    }

    #[test]
    fn test_strict_root_is_exact() {
        assert!(GlobMatcher::new("/").matches("/whoami"));
        let root = GlobMatcher::strict("/");
        assert!(root.matches("/"));
        assert!(!root.matches("/whoami"));
        assert!(!root.matches("/login"));
        assert!(GlobMatcher::strict("/docs/**").matches("/docs/a/b"));
    }

    #[test]
    fn test_question_and_case() {
        assert!(glob_match("/Page1", "/page?"));
        assert!(!glob_match("/page", "/page?"));
    }
}
