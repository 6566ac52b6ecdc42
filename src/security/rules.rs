//! Path based authorization rules.

use std::collections::BTreeSet;

use crate::routing::matcher::{GlobMatcher, Matcher};
use crate::security::credentials::Credentials;

/// What a rule decided for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// No credentials, or credentials without a required role.
    Deny,
}

/// A glob pattern and the roles that may access it.
///
/// An empty role set lets everyone through.
#[derive(Debug, Clone)]
pub struct AuthRule {
    pattern: String,
    matcher: GlobMatcher,
    roles: BTreeSet<String>,
}

impl AuthRule {
    pub fn new<I, S>(pattern: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pattern: pattern.to_string(),
            matcher: GlobMatcher::new(pattern),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Rule admitting everyone.
    pub fn public(pattern: &str) -> Self {
        Self::new(pattern, std::iter::empty::<String>())
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matcher.matches(path)
    }

    pub fn decide(&self, credentials: Option<&Credentials>) -> Decision {
        if self.roles.is_empty() {
            return Decision::Allow;
        }
        match credentials {
            Some(creds) if creds.has_any_role(&self.roles) => Decision::Allow,
            _ => Decision::Deny,
        }
    }
}

/// Ordered rule list with a fallback policy.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<AuthRule>,
    default_allow: bool,
}

impl RuleSet {
    pub fn new(default_allow: bool) -> Self {
        Self {
            rules: Vec::new(),
            default_allow,
        }
    }

    pub fn push(&mut self, rule: AuthRule) {
        self.rules.push(rule);
    }

    /// Put `rule` ahead of every existing rule.
    pub fn push_front(&mut self, rule: AuthRule) {
        self.rules.insert(0, rule);
    }

    pub fn set_default_allow(&mut self, allow: bool) {
        self.default_allow = allow;
    }

    pub fn rules(&self) -> &[AuthRule] {
        &self.rules
    }

    /// First matching rule, if any.
    pub fn find(&self, path: &str) -> Option<&AuthRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    pub fn decide(&self, path: &str, credentials: Option<&Credentials>) -> Decision {
        match self.find(path) {
            Some(rule) => rule.decide(credentials),
            None if self.default_allow => Decision::Allow,
            None => Decision::Deny,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RuleSet {
        let mut set = RuleSet::new(false);
        set.push(AuthRule::new("/admin/*", ["admin"]));
        set.push(AuthRule::public("/*"));
        set
    }

    #[test]
    fn first_match_wins() {
        let set = rules();
        assert_eq!(set.find("/admin/x").map(AuthRule::pattern), Some("/admin/*"));
        assert_eq!(set.find("/public").map(AuthRule::pattern), Some("/*"));
        assert!(set.find("/deep/path").is_none());
    }

    #[test]
    fn role_intersection() {
        let set = rules();
        let user = Credentials::new("u").with_roles(["user"]);
        let admin = Credentials::new("a").with_roles(["user", "admin"]);
        assert_eq!(set.decide("/admin/x", Some(&user)), Decision::Deny);
        assert_eq!(set.decide("/admin/x", Some(&admin)), Decision::Allow);
        assert_eq!(set.decide("/admin/x", None), Decision::Deny);
        assert_eq!(set.decide("/public", None), Decision::Allow);
    }

    #[test]
    fn default_policy() {
        let mut set = rules();
        assert_eq!(set.decide("/deep/path", None), Decision::Deny);
        set.set_default_allow(true);
        assert_eq!(set.decide("/deep/path", None), Decision::Allow);
    }
}
