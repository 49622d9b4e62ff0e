use crate::store::StoreError;
use crate::types::ErrorResponse;
use reqwest::StatusCode;
use std::fmt;

/// The request an [`AuthError`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    DeviceCode,
    Poll,
    Refresh,
    TokenInfo,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::DeviceCode => "device code",
            Operation::Poll => "token poll",
            Operation::Refresh => "token refresh",
            Operation::TokenInfo => "token info",
        })
    }
}

/// Failures of the device authorization flow and of the token lifecycle.
///
/// A poll answered with `authorization_pending` is not an error: the polling loop absorbs it.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The authorization server rejected a request outright. Retrying will not help.
    #[error("{operation} request failed with status {status}: {body}")]
    Server {
        operation: Operation,
        status: StatusCode,
        body: String,
    },

    /// Polling ended with an error other than `authorization_pending`.
    #[error("authorization for user code {user_code} was not granted: {response}")]
    Denied {
        user_code: String,
        response: ErrorResponse,
    },

    /// The device code expired before the user completed the flow.
    #[error("user code {user_code} expired after {expires_in}s without being authorized")]
    Timeout { user_code: String, expires_in: u64 },

    /// The token endpoint refused the refresh token.
    #[error("refresh token was rejected: {response}")]
    RefreshRejected { response: ErrorResponse },

    #[error("refresh access token")]
    Refresh {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("credential has no refresh token")]
    MissingRefreshToken,

    #[error("send {operation} request")]
    Transport {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },

    #[error("parse {operation} response")]
    Decode {
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// True for failures that mean a stored credential can no longer be refreshed.
    ///
    /// Callers use this to decide whether to fall back to a fresh device authorization. Only an
    /// `invalid_grant` answer or a missing refresh token qualify: transport faults and garbled
    /// responses from the token endpoint say nothing about the credential itself.
    pub fn is_refresh_failure(&self) -> bool {
        match self {
            AuthError::RefreshRejected { response } => response.kind == "invalid_grant",
            AuthError::MissingRefreshToken => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(kind: &str) -> AuthError {
        AuthError::RefreshRejected {
            response: ErrorResponse {
                kind: kind.into(),
                description: None,
            },
        }
    }

    #[test]
    fn only_dead_credentials_are_refresh_failures() {
        assert!(rejected("invalid_grant").is_refresh_failure());
        assert!(AuthError::MissingRefreshToken.is_refresh_failure());

        assert!(!rejected("invalid_client").is_refresh_failure());
        assert!(
            !AuthError::Server {
                operation: Operation::Refresh,
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "backend error".into(),
            }
            .is_refresh_failure()
        );
        let garbled = serde_json::from_str::<ErrorResponse>("<html>").unwrap_err();
        assert!(
            !AuthError::Decode {
                operation: Operation::Refresh,
                source: garbled,
            }
            .is_refresh_failure()
        );
    }
}
