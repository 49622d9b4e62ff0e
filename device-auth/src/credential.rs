use crate::types::TokenSet;
use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this long before the server says they are.
const EXPIRY_SAFETY_MARGIN_SECS: u64 = 300;

/// Lifetime assumed for tokens that arrive without `expires_in`.
const ASSUMED_LIFETIME_SECS: u64 = 3600;

/// A [`TokenSet`] together with the moment it was issued.
///
/// The token endpoint only reports a relative lifetime, so the issue time is what makes local
/// expiry checks possible. This is also the record persisted by a
/// [`TokenStore`](crate::TokenStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub token: TokenSet,
    pub issued_at: Timestamp,
}

impl Credential {
    /// Wraps a token that was issued just now.
    pub fn new(token: TokenSet) -> Self {
        Self::issued_at(token, Timestamp::now())
    }

    pub fn issued_at(token: TokenSet, issued_at: Timestamp) -> Self {
        Self { token, issued_at }
    }

    /// Wraps a token of unknown age so that it is refreshed before first use.
    pub fn expired(token: TokenSet) -> Self {
        Self::issued_at(token, Timestamp::UNIX_EPOCH)
    }

    pub fn access_token(&self) -> &str {
        &self.token.access_token
    }

    /// When the access token should no longer be used.
    ///
    /// This is the issue time plus `expires_in`, minus a five minute safety margin. Tokens without
    /// `expires_in` are assumed to live for an hour.
    pub fn expires_at(&self) -> Timestamp {
        let lifetime = self
            .token
            .expires_in
            .unwrap_or(ASSUMED_LIFETIME_SECS)
            .saturating_sub(EXPIRY_SAFETY_MARGIN_SECS);
        let lifetime = SignedDuration::from_secs(i64::try_from(lifetime).unwrap_or(i64::MAX));
        self.issued_at
            .checked_add(lifetime)
            .unwrap_or(Timestamp::MAX)
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expires_at()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Timestamp::now())
    }

    /// Replaces the token with a freshly refreshed one.
    ///
    /// Refresh responses usually carry no refresh token. In that case the previous one is kept,
    /// since it is still the only way to obtain the next access token.
    pub fn superseded_by(self, mut token: TokenSet) -> Self {
        if token.refresh_token.is_none() {
            tracing::trace!("new token lacks refresh token, preserving original");
            token.refresh_token = self.token.refresh_token;
        } else {
            tracing::debug!("new token includes refresh token");
        }
        Self::new(token)
    }
}
