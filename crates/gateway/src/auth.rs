use axum::http::{HeaderMap, header::AUTHORIZATION};

// ── Types ────────────────────────────────────────────────────────────────────

/// Resolved gateway auth configuration.
///
/// The chat core trusts whatever author a client claims; the only gate is an
/// optional shared token on the transport.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAuth {
    pub token: Option<String>,
}

impl ResolvedAuth {
    pub fn is_open(&self) -> bool {
        self.token.is_none()
    }
}

/// Result of an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    pub ok: bool,
    pub reason: Option<&'static str>,
}

impl AuthResult {
    fn allow() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    fn deny(reason: &'static str) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Constant-time string comparison.
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Pull a token from `Authorization: Bearer …`, falling back to `?token=`.
pub fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .or_else(|| query_token.map(str::to_string))
        .filter(|t| !t.is_empty())
}

// ── Auth logic ───────────────────────────────────────────────────────────────

/// Resolve the shared token. The environment wins over the config file;
/// blank values count as unset.
pub fn resolve_auth(config_token: Option<String>, env_token: Option<String>) -> ResolvedAuth {
    let token = env_token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| config_token.filter(|t| !t.trim().is_empty()));
    ResolvedAuth { token }
}

/// Authenticate a WebSocket upgrade or upload request.
pub fn authorize(auth: &ResolvedAuth, provided: Option<&str>) -> AuthResult {
    let Some(expected) = auth.token.as_deref() else {
        return AuthResult::allow();
    };
    let Some(given) = provided else {
        return AuthResult::deny("token_missing");
    };
    if !safe_equal(given, expected) {
        return AuthResult::deny("token_mismatch");
    }
    AuthResult::allow()
}

#[cfg(test)]
mod tests {
    use {super::*, axum::http::HeaderValue};

    #[test]
    fn open_gateway_allows_everyone() {
        let auth = resolve_auth(None, Some("  ".into()));
        assert!(auth.is_open());
        assert!(authorize(&auth, None).ok);
    }

    #[test]
    fn env_token_overrides_config() {
        let auth = resolve_auth(Some("from-file".into()), Some("from-env".into()));
        assert_eq!(auth.token.as_deref(), Some("from-env"));
        assert!(authorize(&auth, Some("from-env")).ok);
        assert_eq!(
            authorize(&auth, Some("from-file")).reason,
            Some("token_mismatch")
        );
        assert_eq!(authorize(&auth, None).reason, Some("token_missing"));
    }

    #[test]
    fn bearer_header_beats_query() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(
            extract_token(&headers, Some("xyz")).as_deref(),
            Some("abc")
        );
        assert_eq!(
            extract_token(&HeaderMap::new(), Some("xyz")).as_deref(),
            Some("xyz")
        );
        assert!(extract_token(&HeaderMap::new(), Some("")).is_none());
    }
}
