use std::{
    fmt,
    time::{Duration, Instant},
};

/// How long a fetched token is reused.
///
/// Tokens are issued for 24 hours; refresh an hour early.
pub(crate) const TOKEN_LIFETIME: Duration = Duration::from_secs(23 * 60 * 60);

/// Last access token and when it stops being reused.
#[derive(Default)]
pub(crate) struct TokenCache {
    cached: Option<(String, Instant)>,
}

impl TokenCache {
    /// The cached token, if it is still fresh at `now`.
    pub(crate) fn get(&self, now: Instant) -> Option<&str> {
        match &self.cached {
            Some((token, expires_at)) if now < *expires_at => Some(token),
            _ => None,
        }
    }

    /// Cache a token fetched at `now`.
    pub(crate) fn store(&mut self, token: String, now: Instant) {
        self.cached = Some((token, now + TOKEN_LIFETIME));
    }

    /// Forget the token, e.g. after the service rejected it.
    pub(crate) fn invalidate(&mut self) {
        self.cached = None;
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("expires_at", &self.cached.as_ref().map(|(_, expires_at)| expires_at))
            .finish_non_exhaustive()
    }
}
