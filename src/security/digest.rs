//! HTTP Digest authentication (RFC 2617, MD5, `qop=auth`).
//!
//! # Data Flow
//! ```text
//! 401 reply  → challenge() stores a fresh nonce → WWW-Authenticate: Digest ...
//! next request carries Authorization: Digest username=.., nonce=.., nc=.., response=..
//!     → DigestAuthorization::parse
//!     → DigestAuthenticator::verify (nonce lookup, nc replay, hash, staleness)
//!     → Credentials
//! ```
//!
//! # Design Decisions
//! - The nonce table is shared by all connections behind one mutex
//! - A challenge older than the TTL is stale; the client may retry with
//!   the same password and a fresh nonce
//! - Entries older than twice the TTL are evicted on every access

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use md5::{Digest, Md5};
use rand::RngCore;

use crate::error::ErrorCondition;
use crate::http::Request;
use crate::security::credentials::Credentials;
use crate::security::password::constant_time_eq;

/// Default lifetime of a nonce.
pub const DEFAULT_NONCE_TTL: Duration = Duration::from_secs(30 * 60);

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn md5_hex(input: &str) -> String {
    hex(&Md5::digest(input.as_bytes()))
}

/// `HA1 = MD5(username:realm:password)`.
pub fn compute_ha1(username: &str, realm: &str, password: &str) -> String {
    md5_hex(&format!("{}:{}:{}", username, realm, password))
}

/// Expected `response` value for `qop=auth`.
pub fn compute_response(
    ha1: &str,
    method: &str,
    uri: &str,
    nonce: &str,
    nc: &str,
    cnonce: &str,
    qop: &str,
) -> String {
    let ha2 = md5_hex(&format!("{}:{}", method, uri));
    md5_hex(&format!("{}:{}:{}:{}:{}:{}", ha1, nonce, nc, cnonce, qop, ha2))
}

/// Password material for one digest user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestUser {
    pub ha1: String,
    pub roles: BTreeSet<String>,
}

/// Looks up precomputed HA1 values.
pub trait DigestUserStore: Send + Sync {
    fn lookup(&self, username: &str) -> Option<DigestUser>;
}

/// In-memory store hashing plaintext passwords once at start-up.
#[derive(Debug)]
pub struct SimpleDigestStore {
    realm: String,
    users: HashMap<String, DigestUser>,
}

impl SimpleDigestStore {
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            users: HashMap::new(),
        }
    }

    pub fn add_user<I, S>(&mut self, username: &str, password: &str, roles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let user = DigestUser {
            ha1: compute_ha1(username, &self.realm, password),
            roles: roles.into_iter().map(Into::into).collect(),
        };
        self.users.insert(username.to_string(), user);
    }
}

impl DigestUserStore for SimpleDigestStore {
    fn lookup(&self, username: &str) -> Option<DigestUser> {
        self.users.get(username).cloned()
    }
}

/// One outstanding challenge.
#[derive(Debug, Clone)]
pub struct DigestChallenge {
    pub nonce: String,
    pub realm: String,
    pub created_at: Instant,
    pub seen_nonce_counters: HashSet<u32>,
}

impl DigestChallenge {
    fn new(realm: &str) -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            nonce: hex(&bytes),
            realm: realm.to_string(),
            created_at: Instant::now(),
            seen_nonce_counters: HashSet::new(),
        }
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Fields of an `Authorization: Digest ...` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestAuthorization {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub qop: String,
    pub nc: String,
    pub cnonce: String,
}

impl DigestAuthorization {
    /// Parse a header value. Returns `None` for other schemes or when a
    /// required field is missing.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim_start();
        let (scheme, rest) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }
        let params = parse_params(rest)?;
        let field = |name: &str| params.get(name).cloned();
        Some(Self {
            username: field("username")?,
            realm: field("realm")?,
            nonce: field("nonce")?,
            uri: field("uri")?,
            response: field("response")?.to_ascii_lowercase(),
            qop: field("qop")?,
            nc: field("nc")?,
            cnonce: field("cnonce")?,
        })
    }
}

/// `key=value` or `key="quoted value"` pairs separated by commas.
fn parse_params(input: &str) -> Option<HashMap<String, String>> {
    let bytes = input.as_bytes();
    let mut params = HashMap::new();
    let mut i = 0;
    loop {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b',') {
            i += 1;
        }
        if i >= bytes.len() {
            return Some(params);
        }

        let key_start = i;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-' || bytes[i] == b'_') {
            i += 1;
        }
        if i == key_start {
            return None;
        }
        let key = input[key_start..i].to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            return None;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value = if bytes.get(i) == Some(&b'"') {
            i += 1;
            let mut value = String::new();
            loop {
                match bytes.get(i) {
                    None => return None,
                    Some(b'"') => {
                        i += 1;
                        break;
                    }
                    Some(b'\\') if i + 1 < bytes.len() => {
                        value.push(bytes[i + 1] as char);
                        i += 2;
                    }
                    Some(_) => {
                        let ch = input[i..].chars().next()?;
                        value.push(ch);
                        i += ch.len_utf8();
                    }
                }
            }
            value
        } else {
            let start = i;
            while i < bytes.len() && bytes[i] != b',' {
                i += 1;
            }
            input[start..i].trim().to_string()
        };
        params.insert(key, value);
    }
}

/// Issues challenges and checks digest responses.
pub struct DigestAuthenticator {
    realm: String,
    ttl: Duration,
    store: Arc<dyn DigestUserStore>,
    challenges: Mutex<HashMap<String, DigestChallenge>>,
}

impl fmt::Debug for DigestAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAuthenticator")
            .field("realm", &self.realm)
            .field("ttl", &self.ttl)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl DigestAuthenticator {
    pub fn new(realm: impl Into<String>, ttl: Duration, store: Arc<dyn DigestUserStore>) -> Self {
        Self {
            realm: realm.into(),
            ttl,
            store,
            challenges: Mutex::new(HashMap::new()),
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, DigestChallenge>> {
        self.challenges.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict(&self, table: &mut HashMap<String, DigestChallenge>) {
        let horizon = self.ttl * 2;
        table.retain(|_, c| c.created_at.elapsed() <= horizon);
    }

    /// Number of challenges currently remembered.
    pub fn outstanding(&self) -> usize {
        self.table().len()
    }

    /// Register a fresh nonce and return the `WWW-Authenticate` value.
    pub fn challenge(&self, stale: bool) -> String {
        let challenge = DigestChallenge::new(&self.realm);
        let mut header = format!(
            "Digest realm=\"{}\", qop=\"auth\", nonce=\"{}\"",
            challenge.realm, challenge.nonce
        );
        if stale {
            header.push_str(", stale=\"true\"");
        }

        let mut table = self.table();
        self.evict(&mut table);
        table.insert(challenge.nonce.clone(), challenge);
        header
    }

    /// Authenticate `request` if it carries a digest `Authorization` header.
    ///
    /// `Ok(None)` means the request did not attempt digest authentication.
    pub fn authenticate(&self, request: &Request) -> Result<Option<Credentials>, ErrorCondition> {
        let Some(header) = request.header("Authorization") else {
            return Ok(None);
        };
        if !header.trim_start().to_ascii_lowercase().starts_with("digest") {
            return Ok(None);
        }
        let auth = DigestAuthorization::parse(header).ok_or_else(|| self.unauthorized())?;
        if auth.uri != request.target() {
            return Err(self.unauthorized());
        }
        self.verify(request.method(), &auth).map(Some)
    }

    fn unauthorized(&self) -> ErrorCondition {
        ErrorCondition::Unauthorized {
            realm: self.realm.clone(),
        }
    }

    /// Check a parsed authorization against the outstanding challenges.
    pub fn verify(&self, method: &str, auth: &DigestAuthorization) -> Result<Credentials, ErrorCondition> {
        if auth.realm != self.realm || !auth.qop.eq_ignore_ascii_case("auth") {
            return Err(self.unauthorized());
        }
        let user = self
            .store
            .lookup(&auth.username)
            .ok_or_else(|| self.unauthorized())?;
        let nc = u32::from_str_radix(&auth.nc, 16).map_err(|_| self.unauthorized())?;

        let mut table = self.table();
        self.evict(&mut table);
        let Some(challenge) = table.get_mut(&auth.nonce) else {
            tracing::debug!(realm = %self.realm, "Digest nonce unknown or evicted");
            return Err(self.unauthorized());
        };

        if !challenge.seen_nonce_counters.insert(nc) {
            tracing::warn!(user = %auth.username, nc = nc, "Digest nonce counter replayed");
            return Err(self.unauthorized());
        }

        let expected = compute_response(
            &user.ha1,
            method,
            &auth.uri,
            &auth.nonce,
            &auth.nc,
            &auth.cnonce,
            &auth.qop,
        );
        if !constant_time_eq(expected.as_bytes(), auth.response.as_bytes()) {
            return Err(self.unauthorized());
        }

        if challenge.is_stale(self.ttl) {
            table.remove(&auth.nonce);
            return Err(ErrorCondition::UnauthorizedStale {
                realm: self.realm.clone(),
            });
        }

        Ok(Credentials::new(auth.username.clone()).with_roles(user.roles))
    }
}
