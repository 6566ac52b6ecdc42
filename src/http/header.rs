//! Ordered, case-insensitive header collection.
//!
//! Headers keep insertion order because that order is observable on the
//! wire (`Set-Cookie` in particular) and a reply that is serialized and
//! parsed again must come back with its headers in the same sequence.

use std::fmt;

/// A single `name: value` pair as received or to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// HTTP header multimap.
///
/// Lookups compare names case-insensitively. Several entries may share a
/// name; `get` returns the first one, `get_all` every one in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing entries with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(Header::new(name, value));
    }

    /// Replace the value of the first header named `name`, or append one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|h| h.name.eq_ignore_ascii_case(&name))
        {
            Some(existing) => existing.value = value,
            None => self.entries.push(Header { name, value }),
        }
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All values for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|h| h.name.eq_ignore_ascii_case(name))
    }

    /// Remove every entry named `name`; returns how many were dropped.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|h| !h.name.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    /// True when a comma-separated header contains `token` (case-insensitive).
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name)
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    pub(crate) fn pop(&mut self) -> Option<Header> {
        self.entries.pop()
    }

    /// Write the header block (without the terminating blank line).
    ///
    /// CR, LF and NUL never reach the wire; a value carrying them cannot
    /// start a new header line.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for h in &self.entries {
            out.extend(h.name.bytes().filter(|b| !is_line_break(*b)));
            out.extend_from_slice(b": ");
            out.extend(h.value.bytes().filter(|b| !is_line_break(*b)));
            out.extend_from_slice(b"\r\n");
        }
    }
}

fn is_line_break(b: u8) -> bool {
    matches!(b, b'\r' | b'\n' | 0)
}

fn wire_safe(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '\r' | '\n' | '\0')).collect()
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for h in &self.entries {
            write!(f, "{}: {}\r\n", wire_safe(&h.name), wire_safe(&h.value))?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(n, v)| Header::new(n, v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case() {
        let mut headers = Headers::new();
        headers.append("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn duplicates_keep_order() {
        let mut headers = Headers::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("X-Other", "x");
        headers.append("set-cookie", "b=2");
        let cookies: Vec<_> = headers.get_all("Set-Cookie").collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(headers.remove("SET-COOKIE"), 2);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn set_replaces_first() {
        let mut headers = Headers::new();
        headers.append("Server", "one");
        headers.set("server", "two");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Server"), Some("two"));
    }

    #[test]
    fn line_breaks_never_reach_the_wire() {
        let mut headers = Headers::new();
        headers.set("Location", "/x\r\nSet-Cookie: access_token=forged\0");
        headers.append("X-Ok", "fine");

        let mut out = Vec::new();
        headers.write_to(&mut out);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "Location: /xSet-Cookie: access_token=forged\r\nX-Ok: fine\r\n");
        assert_eq!(headers.to_string(), text);
    }

    #[test]
    fn token_search() {
        let mut headers = Headers::new();
        headers.append("Connection", "Keep-Alive, Upgrade");
        assert!(headers.has_token("connection", "keep-alive"));
        assert!(!headers.has_token("connection", "close"));
    }
}
