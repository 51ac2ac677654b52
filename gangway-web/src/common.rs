use serde::{Deserialize, Serialize};
use gangway_common::Secret;
use gangway_core::CredentialSource;

pub const PROTOCOL_NAME: &str = "HTTP";

/// Cookie-session key bridging the landing page's auth step into the
/// socket.
pub const SESSION_CONTEXT_KEY: &str = "ssh_context";

pub const SSO_USERNAME_HEADER: &str = "x-apm-username";
pub const SSO_PASSWORD_HEADER: &str = "x-apm-password";
pub const SSO_SESSION_HEADER: &str = "x-apm-session";

/// Everything the landing page hands over to the socket: accumulated
/// credential sources plus terminal/UI hints from the URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredSessionContext {
    pub sources: Vec<CredentialSource>,
    pub term: Option<String>,
    pub env: Vec<(String, String)>,
    pub header: Option<String>,
    pub header_background: Option<String>,
}

/// Parses an `Authorization: Basic ...` header value.
pub fn parse_basic_auth(header: &str) -> Option<(String, Secret<String>)> {
    let value = header.strip_prefix("Basic ")?;
    let decoded = data_encoding::BASE64.decode(value.trim().as_bytes()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    if username.is_empty() {
        return None;
    }
    Some((username.to_owned(), Secret::new(password.to_owned())))
}

pub fn sso_source(username: &str, password: &str) -> CredentialSource {
    CredentialSource::sso_headers(username.to_owned(), Secret::new(password.to_owned()))
}

/// Matches a WebSocket `Origin` header against the configured `host:port`
/// patterns. `*` wildcards either part; `*:*` admits everything.
pub fn origin_allowed(origin: &str, patterns: &[String]) -> bool {
    let (scheme, rest) = match origin.split_once("://") {
        Some(pair) => pair,
        None => ("http", origin),
    };
    let (host, port) = match rest.split_once(':') {
        Some((host, port)) => (host, port.to_owned()),
        None => (
            rest,
            if scheme == "https" { "443" } else { "80" }.to_owned(),
        ),
    };

    patterns.iter().any(|pattern| {
        let (pattern_host, pattern_port) = pattern.split_once(':').unwrap_or((pattern.as_str(), "*"));
        (pattern_host == "*" || pattern_host.eq_ignore_ascii_case(host))
            && (pattern_port == "*" || pattern_port == port)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_auth() {
        // "user:pass"
        let parsed = parse_basic_auth("Basic dXNlcjpwYXNz");
        let (username, password) = parsed.unwrap();
        assert_eq!(username, "user");
        assert_eq!(password.expose(), "pass");

        assert!(parse_basic_auth("Bearer abcdef").is_none());
        assert!(parse_basic_auth("Basic !!!").is_none());
        // ":pass" has no username
        assert!(parse_basic_auth("Basic OnBhc3M=").is_none());
    }

    #[test]
    fn test_origin_wildcards() {
        let all = vec!["*:*".to_owned()];
        assert!(origin_allowed("https://example.com", &all));

        let specific = vec!["localhost:2222".to_owned()];
        assert!(origin_allowed("http://localhost:2222", &specific));
        assert!(!origin_allowed("http://localhost:9999", &specific));
        assert!(!origin_allowed("http://evil.example:2222", &specific));

        let host_wild = vec!["*:443".to_owned()];
        assert!(origin_allowed("https://anything.example", &host_wild));
        assert!(!origin_allowed("http://anything.example", &host_wild));
    }
}
