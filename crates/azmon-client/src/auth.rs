//! Bearer-token source for outbound requests.
//!
//! Token acquisition is out of scope: the daemon is handed a token (flag,
//! environment or config file) and attaches it as-is.

/// Supplies the `Authorization: Bearer …` value for each request.
pub trait TokenSource: Send + Sync {
    /// Current token, or `None` to send requests unauthenticated.
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token. It is never refreshed, so once it expires (about an hour
/// for ARM tokens) every call fails with 401.
#[derive(Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// No token; requests go out without an `Authorization` header.
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = if self.0.is_some() { "<redacted>" } else { "<none>" };
        f.debug_tuple("StaticToken").field(&shown).finish()
    }
}

impl TokenSource for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}
