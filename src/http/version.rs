//! Protocol version carried on start lines.

use std::fmt;

/// `HTTP/<major>.<minor>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    /// Bare `METHOD SP URI CRLF` requests.
    pub const HTTP_09: Version = Version { major: 0, minor: 9 };
    pub const HTTP_10: Version = Version { major: 1, minor: 0 };
    pub const HTTP_11: Version = Version { major: 1, minor: 1 };

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Connections stay open by default from 1.1 on.
    pub fn is_persistent_by_default(&self) -> bool {
        *self >= Version::HTTP_11
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::HTTP_11
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_numbers() {
        assert!(Version::HTTP_09 < Version::HTTP_10);
        assert!(Version::HTTP_10 < Version::HTTP_11);
        assert!(Version::HTTP_11.is_persistent_by_default());
        assert!(!Version::HTTP_10.is_persistent_by_default());
        assert_eq!(Version::HTTP_10.to_string(), "HTTP/1.0");
    }
}
