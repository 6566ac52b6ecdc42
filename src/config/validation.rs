//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (workers > 0, limits > 0, addresses parse)
//! - Check security settings hang together (secret, rules, stored passwords)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::EngineConfig;
use crate::observability::logging::LogFormat;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

fn is_token(method: &str) -> bool {
    !method.is_empty()
        && method
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.trim().is_empty() {
        errors.push(ValidationError::new("listener.bind_address", "must not be empty"));
    }
    if config.listener.worker_threads == 0 {
        errors.push(ValidationError::new("listener.worker_threads", "must be at least 1"));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be at least 1"));
    }

    for method in &config.http.allowed_methods {
        if !is_token(method) {
            errors.push(ValidationError::new(
                "http.allowed_methods",
                format!("'{}' is not a method token", method),
            ));
        }
    }

    let limits = &config.limits;
    for (field, value) in [
        ("limits.max_start_line", limits.max_start_line),
        ("limits.max_header_bytes", limits.max_header_bytes),
        ("limits.max_headers", limits.max_headers),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    let security = &config.security;
    if security.enabled {
        if security.secret.is_empty() {
            errors.push(ValidationError::new("security.secret", "required when security is enabled"));
        }
        if security.realm.contains('"') {
            errors.push(ValidationError::new("security.realm", "must not contain quotes"));
        }
        if security.digest_enabled && security.nonce_ttl_secs == 0 {
            errors.push(ValidationError::new("security.nonce_ttl_secs", "must be greater than 0"));
        }
        if security.pbkdf2_iterations == 0 {
            errors.push(ValidationError::new("security.pbkdf2_iterations", "must be greater than 0"));
        }
        for (i, rule) in security.rules.iter().enumerate() {
            if !rule.pattern.starts_with('/') {
                errors.push(ValidationError::new(
                    &format!("security.rules[{}].pattern", i),
                    "must start with '/'",
                ));
            }
        }
        for (i, user) in security.users.iter().enumerate() {
            if user.username.is_empty() {
                errors.push(ValidationError::new(
                    &format!("security.users[{}].username", i),
                    "must not be empty",
                ));
            }
            if !user.password.contains('$') {
                errors.push(ValidationError::new(
                    &format!("security.users[{}].password", i),
                    "must be a stored form such as pbkdf2_sha256$...",
                ));
            }
        }
    }

    let observability = &config.observability;
    if LogFormat::parse(&observability.log_format).is_none() {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}'", observability.log_format),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RuleConfig, UserConfig};

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut config = EngineConfig::default();
        config.listener.worker_threads = 0;
        config.http.allowed_methods = vec!["GET".into(), "BAD METHOD".into()];
        config.security.enabled = true;
        config.security.rules.push(RuleConfig {
            pattern: "admin".into(),
            roles: vec![],
        });
        config.security.users.push(UserConfig {
            username: "scott".into(),
            password: "tiger".into(),
            roles: vec![],
        });
        config.observability.log_format = "xml".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"listener.worker_threads"));
        assert!(fields.contains(&"http.allowed_methods"));
        assert!(fields.contains(&"security.secret"));
        assert!(fields.contains(&"security.rules[0].pattern"));
        assert!(fields.contains(&"security.users[0].password"));
        assert!(fields.contains(&"observability.log_format"));
    }
}
