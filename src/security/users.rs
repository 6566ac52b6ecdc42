//! User lookup for password and token authentication.

use std::collections::{BTreeSet, HashMap};

use crate::security::credentials::Credentials;

/// What a user service knows about an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDetails {
    pub username: String,
    /// Stored form, e.g. `pbkdf2_sha256$...`.
    pub password: String,
    pub roles: BTreeSet<String>,
}

impl UserDetails {
    pub fn new<I, S>(username: impl Into<String>, password: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            username: username.into(),
            password: password.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone()).with_roles(self.roles.iter().cloned())
    }
}

/// Source of user accounts.
pub trait UserService: Send + Sync {
    fn load_user(&self, username: &str) -> Option<UserDetails>;

    /// Whether credentials issued earlier still grant access.
    fn user_is_valid(&self, credentials: &Credentials) -> bool {
        self.load_user(&credentials.username).is_some()
    }
}

/// In-memory user table.
#[derive(Debug, Default)]
pub struct SimpleUserService {
    users: HashMap<String, UserDetails>,
}

impl SimpleUserService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, user: UserDetails) {
        self.users.insert(user.username.clone(), user);
    }

    pub fn with_user(mut self, user: UserDetails) -> Self {
        self.add_user(user);
        self
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserService for SimpleUserService {
    fn load_user(&self, username: &str) -> Option<UserDetails> {
        self.users.get(username).cloned()
    }
}
