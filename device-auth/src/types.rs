//! Wire types exchanged with the authorization server.

use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Polling interval assumed when the authorization server does not send `interval`.
pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 5;

fn default_polling_interval() -> u64 {
    DEFAULT_POLLING_INTERVAL_SECS
}

/// Codes issued for one device authorization attempt.
///
/// The pair is valid for `expires_in` seconds after issuance. The user visits
/// `verification_url` and types `user_code`, while the device keeps polling with `device_code`
/// every `interval` seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCodePair {
    /// The code the user has to enter at the verification URL.
    pub user_code: String,
    /// Where the user enters the code.
    ///
    /// Google calls this `verification_url`, RFC 8628 calls it `verification_uri`.
    #[serde(alias = "verification_uri")]
    pub verification_url: String,
    /// The code the device presents when polling. Never shown to the user.
    pub device_code: String,
    /// Seconds until both codes expire.
    pub expires_in: u64,
    /// Seconds the device must wait between polls.
    #[serde(default = "default_polling_interval")]
    pub interval: u64,
}

impl DeviceCodePair {
    /// The delay to observe before each poll.
    ///
    /// An interval of zero is raised to one second, otherwise the expiry bound of the polling
    /// loop would never be reached.
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }

    /// How long the codes stay valid after issuance.
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.expires_in)
    }
}

impl fmt::Display for DeviceCodePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Visit {} and enter the code {}",
            self.verification_url, self.user_code
        )
    }
}

/// A bearer credential as issued by the token endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    /// Refresh responses usually omit this; see [`Credential`](crate::Credential) for how the
    /// previous refresh token is carried forward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds, counted from issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    pub token_type: String,
}

// Tokens are secrets, keep them out of logs.
impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl From<BasicTokenResponse> for TokenSet {
    fn from(response: BasicTokenResponse) -> Self {
        Self {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_in: response.expires_in().map(|d| d.as_secs()),
            token_type: response.token_type().as_ref().to_string(),
        }
    }
}

/// An error body returned by the authorization server.
///
/// While polling, `authorization_pending` is the only kind that keeps the flow alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "error")]
    pub kind: String,
    #[serde(
        rename = "error_description",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
}

impl ErrorResponse {
    pub const AUTHORIZATION_PENDING: &'static str = "authorization_pending";

    /// True if the user simply has not finished the flow yet.
    pub fn is_pending(&self) -> bool {
        self.kind == Self::AUTHORIZATION_PENDING
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{} ({})", self.kind, description),
            None => f.write_str(&self.kind),
        }
    }
}

/// Body of a poll response. The presence of `error` decides which variant applies.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum PollResponse {
    Error(ErrorResponse),
    Granted(TokenSet),
}

/// What the token-info endpoint reports about an access token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    /// The client the token was issued to.
    pub aud: String,
    /// Space-separated scopes granted to the token.
    #[serde(default)]
    pub scope: String,
}

impl TokenInfo {
    /// Checks audience and scope against what was requested.
    ///
    /// The scope comparison is an exact string match against the space-joined requested scopes,
    /// in request order. A token granting more, fewer, or differently ordered scopes does not
    /// match.
    pub fn matches(&self, expected_client_id: &str, expected_scope: &str) -> bool {
        self.aud == expected_client_id && self.scope == expected_scope
    }
}

pub(crate) fn join_scopes<S: AsRef<str>>(scopes: &[S]) -> String {
    scopes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn device_code_pair_mirrors_response() {
        let codes: DeviceCodePair = serde_json::from_value(json!({
            "user_code": "GQVQ-JKEC",
            "verification_url": "https://www.google.com/device",
            "device_code": "AH-1Ng2x",
            "expires_in": 1800,
            "interval": 5
        }))
        .unwrap();

        assert_eq!(
            codes,
            DeviceCodePair {
                user_code: "GQVQ-JKEC".into(),
                verification_url: "https://www.google.com/device".into(),
                device_code: "AH-1Ng2x".into(),
                expires_in: 1800,
                interval: 5,
            }
        );
        assert_eq!(codes.polling_interval(), Duration::from_secs(5));
        assert_eq!(codes.lifetime(), Duration::from_secs(1800));
    }

    #[test]
    fn device_code_pair_accepts_rfc_field_name_and_default_interval() {
        let codes: DeviceCodePair = serde_json::from_value(json!({
            "user_code": "ABCD",
            "verification_uri": "https://example.com/device",
            "device_code": "dev",
            "expires_in": 600
        }))
        .unwrap();

        assert_eq!(codes.verification_url, "https://example.com/device");
        assert_eq!(codes.interval, DEFAULT_POLLING_INTERVAL_SECS);
    }

    #[test]
    fn zero_interval_is_raised_to_one_second() {
        let codes = DeviceCodePair {
            user_code: "ABCD".into(),
            verification_url: "https://example.com/device".into(),
            device_code: "dev".into(),
            expires_in: 600,
            interval: 0,
        };
        assert_eq!(codes.polling_interval(), Duration::from_secs(1));
    }

    #[test]
    fn display_shows_url_and_code_verbatim() {
        let codes = DeviceCodePair {
            user_code: "GQVQ-JKEC".into(),
            verification_url: "https://www.google.com/device".into(),
            device_code: "secret-device-code".into(),
            expires_in: 1800,
            interval: 5,
        };
        let shown = codes.to_string();
        assert!(shown.contains("https://www.google.com/device"));
        assert!(shown.contains("GQVQ-JKEC"));
        assert!(!shown.contains("secret-device-code"));
    }

    #[test]
    fn poll_response_with_error_field_is_an_error() {
        let response: PollResponse = serde_json::from_value(json!({
            "error": "authorization_pending",
            "error_description": "Precondition Required"
        }))
        .unwrap();

        let error = match response {
            PollResponse::Error(error) => error,
            other => panic!("expected error response, got {other:?}"),
        };
        assert!(error.is_pending());
        assert_eq!(error.to_string(), "authorization_pending (Precondition Required)");
    }

    #[test]
    fn poll_response_without_error_field_is_a_token() {
        let response: PollResponse = serde_json::from_value(json!({
            "access_token": "ya29.a0",
            "refresh_token": "1//0g",
            "expires_in": 3599,
            "token_type": "Bearer"
        }))
        .unwrap();

        let token = match response {
            PollResponse::Granted(token) => token,
            other => panic!("expected token, got {other:?}"),
        };
        assert_eq!(token.access_token, "ya29.a0");
        assert_eq!(token.refresh_token.as_deref(), Some("1//0g"));
        assert_eq!(token.expires_in, Some(3599));
        assert_eq!(token.token_type, "Bearer");
    }

    #[test]
    fn slow_down_is_not_pending() {
        let error = ErrorResponse {
            kind: "slow_down".into(),
            description: None,
        };
        assert!(!error.is_pending());
        assert_eq!(error.to_string(), "slow_down");
    }

    #[test]
    fn token_debug_output_hides_secrets() {
        let token = TokenSet {
            access_token: "ya29.secret".into(),
            refresh_token: Some("1//refresh-secret".into()),
            expires_in: Some(3599),
            token_type: "Bearer".into(),
        };
        let debug = format!("{token:?}");
        assert!(!debug.contains("ya29.secret"));
        assert!(!debug.contains("refresh-secret"));
    }

    #[test]
    fn token_info_requires_exact_scope_string() {
        let upload = "https://www.googleapis.com/auth/youtube.upload";
        let youtube = "https://www.googleapis.com/auth/youtube";
        let info = |scope: &str| TokenInfo {
            aud: "client-1".into(),
            scope: scope.into(),
        };

        assert!(info(upload).matches("client-1", upload));
        assert!(!info(upload).matches("client-2", upload));
        // superset
        assert!(!info(&format!("{upload} {youtube}")).matches("client-1", upload));
        // subset
        assert!(!info(upload).matches("client-1", &format!("{upload} {youtube}")));
        // same set, different order
        assert!(
            !info(&format!("{youtube} {upload}"))
                .matches("client-1", &format!("{upload} {youtube}"))
        );
    }

    #[test]
    fn scopes_are_joined_in_order() {
        assert_eq!(join_scopes(&["b", "a", "c"]), "b a c");
        assert_eq!(join_scopes::<&str>(&[]), "");
    }
}
