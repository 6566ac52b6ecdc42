//! Signed bearer tokens.
//!
//! Three base64url segments joined with `.`: the fixed header
//! `{"typ":"JWT","alg":"HS256"}`, the credentials as JSON, and
//! `HMAC-SHA256(header "." payload)` under the server secret.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::security::credentials::Credentials;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_HEADER: &str = r#"{"typ":"JWT","alg":"HS256"}"#;

/// Why a token was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token does not have three segments")]
    Malformed,
    #[error("unsupported token header")]
    Header,
    #[error("signature mismatch")]
    Signature,
    #[error("invalid token payload: {0}")]
    Payload(String),
    #[error("token expired")]
    Expired,
    #[error("invalid signing key")]
    Key,
}

/// Issues and checks tokens for one secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::Key)
    }

    fn sign(&self, signing_input: &str) -> Result<String, TokenError> {
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    pub fn issue(&self, credentials: &Credentials) -> Result<String, TokenError> {
        let payload =
            serde_json::to_vec(credentials).map_err(|e| TokenError::Payload(e.to_string()))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(TOKEN_HEADER),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let signature = self.sign(&signing_input)?;
        Ok(format!("{}.{}", signing_input, signature))
    }

    /// Verify signature and header shape, then decode the credentials.
    ///
    /// Expiry is not checked here.
    pub fn validate(&self, token: &str) -> Result<Credentials, TokenError> {
        let mut segments = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed);
        };

        let header_json = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|_| TokenError::Header)?;
        let header_value: serde_json::Value =
            serde_json::from_slice(&header_json).map_err(|_| TokenError::Header)?;
        if header_value != serde_json::json!({ "typ": "JWT", "alg": "HS256" }) {
            return Err(TokenError::Header);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Signature)?;
        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::Signature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| TokenError::Payload(e.to_string()))?;
        serde_json::from_slice(&payload).map_err(|e| TokenError::Payload(e.to_string()))
    }

    /// `validate`, then refuse tokens whose `exp` lies before `now`
    /// (seconds since the Unix epoch). A token is still good at `exp`.
    pub fn validate_at(&self, token: &str, now: u64) -> Result<Credentials, TokenError> {
        let credentials = self.validate(token)?;
        match credentials.exp {
            Some(exp) if now > exp => Err(TokenError::Expired),
            _ => Ok(credentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new("s3cr3t")
    }

    #[test]
    fn issue_and_validate() {
        let creds = Credentials::new("scott").with_roles(["USER", "ADMIN"]);
        let token = signer().issue(&creds).unwrap();
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(signer().validate(&token).unwrap(), creds);
    }

    #[test]
    fn any_altered_signature_byte_fails() {
        let token = signer().issue(&Credentials::new("scott")).unwrap();
        let sig_start = token.rfind('.').unwrap() + 1;
        let mut bytes = token.clone().into_bytes();
        bytes[sig_start] = if bytes[sig_start] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert_eq!(signer().validate(&tampered), Err(TokenError::Signature));

        // re-signing the same header and payload restores validity
        let (signing_input, _) = tampered.rsplit_once('.').unwrap();
        let resigned = format!("{}.{}", signing_input, signer().sign(signing_input).unwrap());
        assert!(signer().validate(&resigned).is_ok());
    }

    #[test]
    fn other_secret_fails() {
        let token = signer().issue(&Credentials::new("scott")).unwrap();
        assert_eq!(
            TokenSigner::new("other").validate(&token),
            Err(TokenError::Signature)
        );
    }

    #[test]
    fn header_shape_is_enforced() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"typ":"JWT","alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(r#"{"username":"x"}"#);
        let input = format!("{}.{}", header, payload);
        let token = format!("{}.{}", input, signer().sign(&input).unwrap());
        assert_eq!(signer().validate(&token), Err(TokenError::Header));
        assert_eq!(signer().validate("a.b"), Err(TokenError::Malformed));
        assert_eq!(signer().validate("a.b.c.d"), Err(TokenError::Malformed));
    }

    #[test]
    fn expiry_boundary() {
        let mut creds = Credentials::new("scott");
        creds.exp = Some(1_000);
        let token = signer().issue(&creds).unwrap();
        assert!(signer().validate_at(&token, 999).is_ok());
        assert!(signer().validate_at(&token, 1_000).is_ok());
        assert_eq!(signer().validate_at(&token, 1_001), Err(TokenError::Expired));

        let forever = signer().issue(&Credentials::new("scott")).unwrap();
        assert!(signer().validate_at(&forever, u64::MAX).is_ok());
    }
}
