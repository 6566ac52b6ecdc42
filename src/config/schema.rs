//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the HTTP engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Listener configuration (bind address, port, workers).
    pub listener: ListenerConfig,

    /// Protocol-level behaviour.
    pub http: HttpConfig,

    /// Parser size ceilings.
    pub limits: LimitsConfig,

    /// Authentication and authorization.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0").
    pub bind_address: String,

    /// TCP port; 0 picks an ephemeral port.
    pub port: u16,

    /// Size of the worker pool.
    pub worker_threads: usize,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            worker_threads: 4,
            max_connections: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Methods accepted by the dispatcher; empty accepts all.
    pub allowed_methods: Vec<String>,

    /// Take the client address from the last `X-Forwarded-For` hop.
    pub trust_forwarded: bool,

    /// Value of the `Server` header.
    pub server_name: String,

    /// Header echoing the request id; empty disables it.
    pub request_id_header: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            allowed_methods: Vec::new(),
            trust_forwarded: false,
            server_name: crate::http::response::DEFAULT_SERVER_NAME.to_string(),
            request_id_header: "X-Request-Id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_start_line: usize,
    pub max_header_bytes: usize,
    pub max_headers: usize,
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let limits = crate::http::ParserLimits::default();
        Self {
            max_start_line: limits.max_start_line,
            max_header_bytes: limits.max_header_bytes,
            max_headers: limits.max_headers,
            max_body_size: limits.max_body_size,
        }
    }
}

impl From<&LimitsConfig> for crate::http::ParserLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_start_line: config.max_start_line,
            max_header_bytes: config.max_header_bytes,
            max_headers: config.max_headers,
            max_body_size: config.max_body_size,
        }
    }
}

/// One authorization rule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RuleConfig {
    pub pattern: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// One user account.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UserConfig {
    pub username: String,
    /// Stored form for `users`, plaintext for `digest_users`.
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub enabled: bool,

    /// HMAC key for access tokens.
    pub secret: String,

    pub realm: String,

    /// Policy for paths no rule matches.
    pub default_allow: bool,

    pub validate_csrf: bool,

    /// Access token lifetime; 0 means no expiry.
    pub token_lifetime_secs: u64,

    pub digest_enabled: bool,

    /// Age after which a digest nonce is stale.
    pub nonce_ttl_secs: u64,

    pub pbkdf2_iterations: u32,

    /// Serve `/login` and `/logout`.
    pub login_enabled: bool,

    pub rules: Vec<RuleConfig>,

    pub users: Vec<UserConfig>,

    pub digest_users: Vec<UserConfig>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret: String::new(),
            realm: "http-engine".to_string(),
            default_allow: true,
            validate_csrf: true,
            token_lifetime_secs: 0,
            digest_enabled: false,
            nonce_ttl_secs: 1800,
            pbkdf2_iterations: 30_000,
            login_enabled: true,
            rules: Vec::new(),
            users: Vec::new(),
            digest_users: Vec::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// `pretty` or `json`.
    pub log_format: String,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.security.nonce_ttl_secs, 1800);
        assert_eq!(config.security.pbkdf2_iterations, 30_000);
        assert!(config.http.allowed_methods.is_empty());
    }

    #[test]
    fn parses_rules_and_users() {
        let config: EngineConfig = toml::from_str(
            r#"
            [listener]
            port = 9000

            [security]
            enabled = true
            secret = "s3cret"
            default_allow = false

            [[security.rules]]
            pattern = "/admin/**"
            roles = ["admin"]

            [[security.rules]]
            pattern = "/**"

            [[security.users]]
            username = "scott"
            password = "pbkdf2_sha256$10$c2FsdA$AAAA"
            roles = ["admin"]
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.listener.worker_threads, 4);
        assert_eq!(config.security.rules.len(), 2);
        assert!(config.security.rules[1].roles.is_empty());
        assert_eq!(config.security.users[0].roles, vec!["admin"]);
    }
}
