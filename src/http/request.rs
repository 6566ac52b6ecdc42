//! Parsed HTTP request.
//!
//! A `Request` is immutable once the parser hands it over, except for the
//! fields the connection and dispatcher fill in afterwards: the remote
//! address, the local endpoint and the credentials established by the
//! security layer.

use std::net::SocketAddr;
use std::time::SystemTime;

use url::Url;

use crate::http::header::Headers;
use crate::http::version::Version;
use crate::security::credentials::Credentials;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// An HTTP request as received on a connection.
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    target: String,
    version: Version,
    headers: Headers,
    trailers: Headers,
    payload: Vec<u8>,
    remote_address: String,
    local_address: Option<SocketAddr>,
    timestamp: SystemTime,
    credentials: Option<Credentials>,
    added_cookies: Vec<(String, String)>,
}

impl Request {
    pub fn from_parts(
        method: String,
        target: String,
        version: Version,
        headers: Headers,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            method,
            target,
            version,
            headers,
            trailers: Headers::new(),
            payload,
            remote_address: String::new(),
            local_address: None,
            timestamp: SystemTime::now(),
            credentials: None,
            added_cookies: Vec::new(),
        }
    }

    /// Start building a request, mostly useful for clients and tests.
    pub fn builder(method: impl Into<String>, target: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            request: Request::from_parts(
                method.into(),
                target.into(),
                Version::HTTP_11,
                Headers::new(),
                Vec::new(),
            ),
        }
    }

    pub(crate) fn with_trailers(mut self, trailers: Headers) -> Self {
        self.trailers = trailers;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request target exactly as it appeared on the start line.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Trailer fields received after a chunked body.
    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    pub fn set_remote_address(&mut self, address: impl Into<String>) {
        self.remote_address = address.into();
    }

    pub fn local_address(&self) -> Option<SocketAddr> {
        self.local_address
    }

    pub fn set_local_address(&mut self, address: SocketAddr) {
        self.local_address = Some(address);
    }

    /// When the request finished arriving.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    pub fn username(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.username.as_str())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.credentials
            .as_ref()
            .map_or(false, |c| c.roles.contains(role))
    }

    fn resolved(&self) -> Option<Url> {
        let base = Url::parse("http://localhost/").ok()?;
        base.join(&self.target).ok()
    }

    /// Path of the target with dot-segments removed; always starts with `/`.
    ///
    /// Percent-encoding is kept as received.
    pub fn path(&self) -> String {
        self.resolved()
            .map(|url| url.path().to_string())
            .unwrap_or_else(|| "/".to_string())
    }

    pub fn query(&self) -> Option<String> {
        self.resolved().and_then(|url| url.query().map(str::to_string))
    }

    fn is_form_post(&self) -> bool {
        self.method.eq_ignore_ascii_case("POST")
            && self
                .headers
                .get("Content-Type")
                .map_or(false, |ct| {
                    ct.trim_start()
                        .to_ascii_lowercase()
                        .starts_with(FORM_CONTENT_TYPE)
                })
    }

    /// Query string parameters followed by url-encoded form fields.
    pub fn parameters(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .resolved()
            .map(|url| url.query_pairs().into_owned().collect())
            .unwrap_or_default();
        if self.is_form_post() {
            params.extend(url::form_urlencoded::parse(&self.payload).into_owned());
        }
        params
    }

    pub fn parameter(&self, name: &str) -> Option<String> {
        self.parameters()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Value of a request cookie.
    ///
    /// Cookies added with `add_cookie` shadow those sent by the client.
    pub fn cookie(&self, name: &str) -> Option<String> {
        if let Some((_, value)) = self.added_cookies.iter().find(|(n, _)| n == name) {
            return Some(value.clone());
        }
        self.headers
            .get_all("Cookie")
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.trim_matches('"').to_string())
    }

    /// Make a cookie visible to later handlers of this request.
    pub fn add_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.added_cookies.retain(|(n, _)| *n != name);
        self.added_cookies.push((name, value.into()));
    }

    /// Whether the client wants the connection to persist.
    pub fn keep_alive(&self) -> bool {
        if self.headers.has_token("Connection", "close") {
            return false;
        }
        self.version.is_persistent_by_default()
            || (self.version == Version::HTTP_10
                && self.headers.has_token("Connection", "keep-alive"))
    }

    /// True when the `Accept` header lists `mime`.
    pub fn accepts(&self, mime: &str) -> bool {
        self.headers
            .get_all("Accept")
            .flat_map(|v| v.split(','))
            .filter_map(|item| item.split(';').next())
            .any(|item| item.trim().eq_ignore_ascii_case(mime))
    }

    /// Serialize for sending.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.payload.len());
        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.target.as_bytes());
        if self.version == Version::HTTP_09 {
            out.extend_from_slice(b"\r\n");
            return out;
        }
        out.extend_from_slice(format!(" {}\r\n", self.version).as_bytes());
        self.headers.write_to(&mut out);
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Builder returned by [`Request::builder`].
#[derive(Debug)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn version(mut self, version: Version) -> Self {
        self.request.version = version;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.append(name, value);
        self
    }

    /// Set the payload and a matching `Content-Length`.
    pub fn body(mut self, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        self.request
            .headers
            .set("Content-Length", payload.len().to_string());
        self.request.payload = payload;
        self
    }

    /// Url-encode `fields` as a form body.
    pub fn form(self, fields: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.header("Content-Type", FORM_CONTENT_TYPE).body(encoded)
    }

    pub fn remote_address(mut self, address: impl Into<String>) -> Self {
        self.request.remote_address = address.into();
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_removes_dot_segments() {
        let request = Request::builder("GET", "/a/./b/../c?x=1").build();
        assert_eq!(request.path(), "/a/c");
        assert_eq!(request.query().as_deref(), Some("x=1"));

        let request = Request::builder("GET", "http://example.org/abs/path").build();
        assert_eq!(request.path(), "/abs/path");
    }

    #[test]
    fn parameters_come_from_query_and_form() {
        let request = Request::builder("POST", "/login?uri=%2Fhome")
            .form(&[("username", "scott"), ("password", "tiger pw")])
            .build();
        assert_eq!(request.parameter("uri").as_deref(), Some("/home"));
        assert_eq!(request.parameter("password").as_deref(), Some("tiger pw"));
        assert_eq!(request.parameter("missing"), None);
    }

    #[test]
    fn form_fields_need_form_content_type() {
        let request = Request::builder("POST", "/x")
            .header("Content-Type", "text/plain")
            .body("a=b")
            .build();
        assert_eq!(request.parameter("a"), None);
    }

    #[test]
    fn cookies_and_overrides() {
        let mut request = Request::builder("GET", "/")
            .header("Cookie", "a=1; csrf-token=abc")
            .header("Cookie", "b=\"2\"")
            .build();
        assert_eq!(request.cookie("csrf-token").as_deref(), Some("abc"));
        assert_eq!(request.cookie("b").as_deref(), Some("2"));
        request.add_cookie("a", "override");
        assert_eq!(request.cookie("a").as_deref(), Some("override"));
    }

    #[test]
    fn keep_alive_rules() {
        let req = |version, connection: Option<&str>| {
            let mut builder = Request::builder("GET", "/").version(version);
            if let Some(value) = connection {
                builder = builder.header("Connection", value);
            }
            builder.build().keep_alive()
        };
        assert!(req(Version::HTTP_11, None));
        assert!(!req(Version::HTTP_11, Some("close")));
        assert!(!req(Version::HTTP_10, None));
        assert!(req(Version::HTTP_10, Some("Keep-Alive")));
        assert!(!req(Version::HTTP_09, None));
    }

    #[test]
    fn wire_form() {
        let request = Request::builder("POST", "/echo")
            .header("Host", "localhost")
            .body("hi")
            .build();
        assert_eq!(
            request.to_wire(),
            b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 2\r\n\r\nhi".to_vec()
        );
    }
}
