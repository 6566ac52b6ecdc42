//! Request authorization, login support and CSRF enforcement.
//!
//! # Data Flow
//! ```text
//! validate_request(request)
//!     → access_token cookie   → TokenSigner::validate_at → lifetime → UserService
//!     → Authorization: Digest → DigestAuthenticator (when configured)
//!     → RuleSet::decide(path, credentials)
//!     → CSRF check on state-changing methods
//!     → mint csrf-token when the client has none
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::ErrorCondition;
use crate::http::{Request, Response};
use crate::observability::logging::RequestLog;
use crate::security::credentials::Credentials;
use crate::security::csrf;
use crate::security::digest::DigestAuthenticator;
use crate::security::password::{PasswordEncoder, Pbkdf2Sha256Encoder};
use crate::security::rules::{AuthRule, Decision, RuleSet};
use crate::security::token::{TokenError, TokenSigner};
use crate::security::users::UserService;

/// Cookie carrying the signed bearer token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Failures of the explicit login operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityError {
    #[error("invalid username or password")]
    InvalidPassword,
    #[error("no user service configured")]
    NoUserService,
    #[error("token error: {0}")]
    Token(#[from] TokenError),
}

/// Outcome of a successful `validate_request`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    /// Token minted for a client without a CSRF cookie; the dispatcher
    /// attaches it to the response.
    pub fresh_csrf: Option<String>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Shared security state for one server.
pub struct SecurityContext {
    realm: String,
    signer: TokenSigner,
    rules: RuleSet,
    users: Option<Arc<dyn UserService>>,
    encoders: HashMap<&'static str, Arc<dyn PasswordEncoder>>,
    default_encoder: Arc<dyn PasswordEncoder>,
    digest: Option<DigestAuthenticator>,
    validate_csrf: bool,
    token_lifetime: Option<Duration>,
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("realm", &self.realm)
            .field("rules", &self.rules.rules().len())
            .field("digest", &self.digest.is_some())
            .field("validate_csrf", &self.validate_csrf)
            .field("token_lifetime", &self.token_lifetime)
            .finish_non_exhaustive()
    }
}

impl SecurityContext {
    pub fn new(secret: impl Into<Vec<u8>>, realm: impl Into<String>) -> Self {
        let default_encoder: Arc<dyn PasswordEncoder> = Arc::new(Pbkdf2Sha256Encoder::default());
        let mut encoders = HashMap::new();
        encoders.insert(default_encoder.name(), Arc::clone(&default_encoder));
        Self {
            realm: realm.into(),
            signer: TokenSigner::new(secret),
            rules: RuleSet::new(true),
            users: None,
            encoders,
            default_encoder,
            digest: None,
            validate_csrf: true,
            token_lifetime: None,
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn with_rule(mut self, rule: AuthRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn add_rule(&mut self, rule: AuthRule) {
        self.rules.push(rule);
    }

    /// Rule evaluated before all others.
    pub fn add_priority_rule(&mut self, rule: AuthRule) {
        self.rules.push_front(rule);
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn with_default_allow(mut self, allow: bool) -> Self {
        self.rules.set_default_allow(allow);
        self
    }

    pub fn with_user_service(mut self, users: Arc<dyn UserService>) -> Self {
        self.users = Some(users);
        self
    }

    /// Register an encoder; the most recently added one encodes new passwords.
    pub fn with_encoder(mut self, encoder: Arc<dyn PasswordEncoder>) -> Self {
        self.encoders.insert(encoder.name(), Arc::clone(&encoder));
        self.default_encoder = encoder;
        self
    }

    pub fn with_digest(mut self, digest: DigestAuthenticator) -> Self {
        self.digest = Some(digest);
        self
    }

    pub fn digest(&self) -> Option<&DigestAuthenticator> {
        self.digest.as_ref()
    }

    pub fn with_csrf_validation(mut self, enabled: bool) -> Self {
        self.validate_csrf = enabled;
        self
    }

    pub fn with_token_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.token_lifetime = lifetime.filter(|d| !d.is_zero());
        self
    }

    /// Stored form of `password` under the default encoder.
    pub fn encode_password(&self, password: &str) -> String {
        self.default_encoder.encode(password)
    }

    /// Check a username/password pair against the user service.
    ///
    /// The encoder is chosen by the prefix of the stored form. Every
    /// failure reports `InvalidPassword` so callers cannot tell unknown
    /// users from bad passwords.
    pub fn verify_username_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Credentials, SecurityError> {
        let users = self.users.as_ref().ok_or(SecurityError::NoUserService)?;
        let user = users
            .load_user(username)
            .ok_or(SecurityError::InvalidPassword)?;
        let prefix = user.password.split('$').next().unwrap_or_default();
        let encoder = self
            .encoders
            .get(prefix)
            .ok_or(SecurityError::InvalidPassword)?;
        if encoder.matches(password, &user.password) {
            Ok(user.credentials())
        } else {
            Err(SecurityError::InvalidPassword)
        }
    }

    /// Issue a token for `credentials` and set it as the `access_token` cookie.
    pub fn add_authorization_headers(
        &self,
        response: &mut Response,
        credentials: &Credentials,
    ) -> Result<(), SecurityError> {
        let mut claims = credentials.clone();
        let issued = now_secs();
        claims.iat = Some(issued);
        claims.exp = self.token_lifetime.map(|life| issued + life.as_secs());
        let token = self.signer.issue(&claims)?;

        let max_age = self.token_lifetime.map(|life| life.as_secs().to_string());
        let mut directives: Vec<(&str, &str)> =
            vec![("HttpOnly", ""), ("SameSite", "Lax"), ("Path", "/")];
        if let Some(max_age) = max_age.as_deref() {
            directives.push(("Max-Age", max_age));
        }
        response.set_cookie(ACCESS_TOKEN_COOKIE, &token, &directives);
        Ok(())
    }

    /// Drop the `access_token` cookie on the client.
    pub fn remove_authorization(&self, response: &mut Response) {
        response.delete_cookie(ACCESS_TOKEN_COOKIE);
    }

    /// The request's CSRF token, minting one if the client has none.
    pub fn get_csrf_token(&self, request: &mut Request) -> String {
        if let Some(token) = request.cookie(csrf::CSRF_COOKIE).filter(|t| !t.is_empty()) {
            return token;
        }
        let token = csrf::mint_token();
        request.add_cookie(csrf::CSRF_COOKIE, token.clone());
        token
    }

    /// `WWW-Authenticate` value for a 401, when digest is configured.
    pub fn challenge_header(&self, stale: bool) -> Option<String> {
        self.digest.as_ref().map(|digest| digest.challenge(stale))
    }

    fn unauthorized(&self) -> ErrorCondition {
        ErrorCondition::Unauthorized {
            realm: self.realm.clone(),
        }
    }

    fn token_credentials(&self, request: &Request, log: &mut RequestLog) -> Option<Credentials> {
        let token = request.cookie(ACCESS_TOKEN_COOKIE).filter(|t| !t.is_empty())?;
        let now = now_secs();
        let credentials = match self.signer.validate_at(&token, now) {
            Ok(credentials) => credentials,
            Err(e) => {
                log.note(format!("access token rejected: {}", e));
                return None;
            }
        };

        // tokens without exp still age out under the configured lifetime
        let lifetime_end = match (credentials.exp, credentials.iat, self.token_lifetime) {
            (None, Some(iat), Some(lifetime)) => Some(iat.saturating_add(lifetime.as_secs())),
            _ => None,
        };
        if lifetime_end.is_some_and(|end| now > end) {
            log.note("access token expired");
            return None;
        }

        if let Some(users) = &self.users {
            if !users.user_is_valid(&credentials) {
                log.note("access token user no longer valid");
                return None;
            }
        }
        Some(credentials)
    }

    /// Authenticate and authorize `request`.
    ///
    /// On success the request carries its credentials (if any) and the
    /// returned value says whether a fresh CSRF cookie must be sent.
    pub fn validate_request(
        &self,
        request: &mut Request,
        log: &mut RequestLog,
    ) -> Result<Validation, ErrorCondition> {
        let mut digest_error = None;
        let mut credentials = self.token_credentials(request, log);

        if credentials.is_none() {
            if let Some(digest) = &self.digest {
                match digest.authenticate(request) {
                    Ok(found) => credentials = found,
                    Err(e) => {
                        log.note(format!("digest rejected: {}", e));
                        digest_error = Some(e);
                    }
                }
            }
        }

        if let Some(creds) = &credentials {
            log.set_user(&creds.username);
        }

        let path = request.path();
        if self.rules.decide(&path, credentials.as_ref()) == Decision::Deny {
            return Err(match (credentials, digest_error) {
                (Some(_), _) => ErrorCondition::Forbidden,
                (None, Some(err)) => err,
                (None, None) => self.unauthorized(),
            });
        }

        if let Some(creds) = credentials {
            request.set_credentials(creds);
        }

        if self.validate_csrf && csrf::is_state_changing(request.method()) && !csrf::verify(request) {
            log.note("csrf token mismatch");
            return Err(ErrorCondition::Forbidden);
        }

        let mut validation = Validation::default();
        if request.cookie(csrf::CSRF_COOKIE).map_or(true, |t| t.is_empty()) {
            validation.fresh_csrf = Some(self.get_csrf_token(request));
        }
        Ok(validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;
    use crate::security::digest::{compute_ha1, compute_response, SimpleDigestStore, DEFAULT_NONCE_TTL};
    use crate::security::users::{SimpleUserService, UserDetails};

    fn context() -> SecurityContext {
        let encoder = Pbkdf2Sha256Encoder::new(10);
        let users = SimpleUserService::new()
            .with_user(UserDetails::new("scott", encoder.encode("tiger"), ["user"]))
            .with_user(UserDetails::new("root", encoder.encode("toor"), ["user", "admin"]));
        SecurityContext::new("secret", "test")
            .with_rule(AuthRule::new("/admin/*", ["admin"]))
            .with_rule(AuthRule::public("/*"))
            .with_default_allow(false)
            .with_user_service(Arc::new(users))
    }

    fn log_for(request: &Request) -> RequestLog {
        RequestLog::new(request)
    }

    fn token_cookie(ctx: &SecurityContext, username: &str, password: &str) -> String {
        let creds = ctx.verify_username_password(username, password).unwrap();
        let mut response = Response::new(StatusCode::OK);
        ctx.add_authorization_headers(&mut response, &creds).unwrap();
        let token = response.cookie(ACCESS_TOKEN_COOKIE).unwrap();
        format!("{}={}; csrf-token=c", ACCESS_TOKEN_COOKIE, token)
    }

    fn validate(ctx: &SecurityContext, request: &mut Request) -> Result<Validation, ErrorCondition> {
        let mut log = log_for(request);
        ctx.validate_request(request, &mut log)
    }

    #[test]
    fn verify_password_hides_reason() {
        let ctx = context();
        assert!(ctx.verify_username_password("scott", "tiger").is_ok());
        assert_eq!(
            ctx.verify_username_password("scott", "lion"),
            Err(SecurityError::InvalidPassword)
        );
        assert_eq!(
            ctx.verify_username_password("nobody", "tiger"),
            Err(SecurityError::InvalidPassword)
        );
    }

    #[test]
    fn authorization_cookie_directives() {
        let ctx = context().with_token_lifetime(Some(Duration::from_secs(60)));
        let creds = ctx.verify_username_password("scott", "tiger").unwrap();
        let mut response = Response::new(StatusCode::OK);
        ctx.add_authorization_headers(&mut response, &creds).unwrap();
        let header = response.header("Set-Cookie").unwrap();
        assert!(header.starts_with("access_token="));
        assert!(header.contains("; HttpOnly; SameSite=Lax"));
        assert!(header.ends_with("Max-Age=60"));

        let token = response.cookie(ACCESS_TOKEN_COOKIE).unwrap();
        let claims = ctx.signer().validate(&token).unwrap();
        assert_eq!(claims.exp, claims.iat.map(|iat| iat + 60));
    }

    #[test]
    fn public_path_without_credentials() {
        let ctx = context();
        let mut request = Request::builder("GET", "/public").build();
        let validation = validate(&ctx, &mut request).unwrap();
        assert!(request.credentials().is_none());
        let fresh = validation.fresh_csrf.unwrap();
        assert_eq!(request.cookie("csrf-token"), Some(fresh));
    }

    #[test]
    fn admin_path_requires_role() {
        let ctx = context();

        let mut anonymous = Request::builder("GET", "/admin/x").build();
        assert_eq!(
            validate(&ctx, &mut anonymous),
            Err(ErrorCondition::Unauthorized { realm: "test".into() })
        );

        let mut user = Request::builder("GET", "/admin/x")
            .header("Cookie", token_cookie(&ctx, "scott", "tiger"))
            .build();
        assert_eq!(validate(&ctx, &mut user), Err(ErrorCondition::Forbidden));

        let mut admin = Request::builder("GET", "/admin/x")
            .header("Cookie", token_cookie(&ctx, "root", "toor"))
            .build();
        let validation = validate(&ctx, &mut admin).unwrap();
        assert_eq!(admin.username(), Some("root"));
        assert!(validation.fresh_csrf.is_none());
    }

    #[test]
    fn unmatched_path_uses_default() {
        let ctx = context();
        let mut request = Request::builder("GET", "/a/b/c").build();
        assert!(validate(&ctx, &mut request).is_err());

        let ctx = context().with_default_allow(true);
        let mut request = Request::builder("GET", "/a/b/c").build();
        assert!(validate(&ctx, &mut request).is_ok());
    }

    #[test]
    fn expired_token_is_ignored() {
        let ctx = context();
        let mut creds = Credentials::new("root").with_roles(["admin"]);
        creds.exp = Some(1);
        let token = ctx.signer().issue(&creds).unwrap();
        let mut request = Request::builder("GET", "/admin/x")
            .header("Cookie", format!("access_token={}", token))
            .build();
        assert!(matches!(
            validate(&ctx, &mut request),
            Err(ErrorCondition::Unauthorized { .. })
        ));
    }

    #[test]
    fn csrf_mismatch_is_forbidden() {
        let ctx = context();
        let mut bad = Request::builder("POST", "/login")
            .header("Cookie", "csrf-token=good")
            .form(&[("_csrf", "evil")])
            .build();
        assert_eq!(validate(&ctx, &mut bad), Err(ErrorCondition::Forbidden));

        let mut missing = Request::builder("POST", "/login").build();
        assert_eq!(validate(&ctx, &mut missing), Err(ErrorCondition::Forbidden));

        let mut good = Request::builder("POST", "/login")
            .header("Cookie", "csrf-token=good")
            .form(&[("_csrf", "good")])
            .build();
        assert!(validate(&ctx, &mut good).is_ok());

        let relaxed = context().with_csrf_validation(false);
        let mut unchecked = Request::builder("POST", "/login").build();
        assert!(validate(&relaxed, &mut unchecked).is_ok());
    }

    #[test]
    fn digest_login_grants_roles() {
        let mut store = SimpleDigestStore::new("test");
        store.add_user("root", "toor", ["admin"]);
        let ctx = context().with_digest(DigestAuthenticator::new(
            "test",
            DEFAULT_NONCE_TTL,
            Arc::new(store),
        ));

        let challenge = ctx.challenge_header(false).unwrap();
        let start = challenge.find("nonce=\"").unwrap() + 7;
        let nonce = &challenge[start..start + 64];
        let ha1 = compute_ha1("root", "test", "toor");
        let response = compute_response(&ha1, "GET", "/admin/x", nonce, "00000001", "cn", "auth");
        let header = format!(
            r#"Digest username="root", realm="test", nonce="{}", uri="/admin/x", qop=auth, nc=00000001, cnonce="cn", response="{}""#,
            nonce, response
        );

        let mut request = Request::builder("GET", "/admin/x")
            .header("Authorization", header.clone())
            .build();
        assert!(validate(&ctx, &mut request).is_ok());
        assert!(request.has_role("admin"));

        let mut replay = Request::builder("GET", "/admin/x")
            .header("Authorization", header)
            .build();
        assert!(matches!(
            validate(&ctx, &mut replay),
            Err(ErrorCondition::Unauthorized { .. })
        ));
    }
}
