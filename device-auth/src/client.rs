//! The device authorization protocol client.

use crate::credential::Credential;
use crate::error::{AuthError, Operation};
use crate::store::TokenStore;
use crate::types::{DeviceCodePair, PollResponse, TokenInfo, TokenSet, join_scopes};
use oauth2::basic::BasicClient;
use oauth2::{AuthType, ClientId, ClientSecret, RefreshToken, TokenUrl};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::instrument;

/// Grant type Google expects when polling for a device authorization.
pub const DEVICE_GRANT_TYPE: &str = "http://oauth.net/grant_type/device/1.0";

const DEVICE_CODE_URL: &str = "https://accounts.google.com/o/oauth2/device/code";
const TOKEN_URL: &str = "https://www.googleapis.com/oauth2/v4/token";
const TOKEN_INFO_URL: &str = "https://www.googleapis.com/oauth2/v3/tokeninfo";

/// The identity of an installed application as registered with Google.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientSecrets {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Where the authorization server lives.
///
/// The defaults point at Google. Tests point them at a local mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub device_code: String,
    pub token: String,
    pub token_info: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            device_code: DEVICE_CODE_URL.to_string(),
            token: TOKEN_URL.to_string(),
            token_info: TOKEN_INFO_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Google's endpoint paths, rooted at `base` instead of the Google hosts.
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            device_code: format!("{base}/o/oauth2/device/code"),
            token: format!("{base}/oauth2/v4/token"),
            token_info: format!("{base}/oauth2/v3/tokeninfo"),
        }
    }
}

/// Drives the OAuth 2.0 device authorization grant and the lifecycle of the resulting tokens.
///
/// The HTTP client is shared: cloning a [`DeviceAuthClient`] reuses the same connection pool, and
/// the pool is released once the last clone is dropped. All requests issued by one client are
/// sequential.
#[derive(Debug, Clone)]
pub struct DeviceAuthClient {
    http: reqwest::Client,
    secrets: ClientSecrets,
    endpoints: Endpoints,
}

impl DeviceAuthClient {
    pub fn new(secrets: ClientSecrets, http: reqwest::Client) -> Self {
        Self {
            http,
            secrets,
            endpoints: Endpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.secrets.client_id
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Asks the authorization server for a device code and a user code.
    ///
    /// Any non-success status is returned as [`AuthError::Server`] without retrying: a rejected
    /// client id or scope will not start working on its own.
    #[instrument(skip_all, fields(scope = tracing::field::Empty), err)]
    pub async fn request_codes<S: AsRef<str>>(
        &self,
        scopes: &[S],
    ) -> Result<DeviceCodePair, AuthError> {
        let scope = join_scopes(scopes);
        tracing::Span::current().record("scope", scope.as_str());

        let response = self
            .post_form(
                Operation::DeviceCode,
                &self.endpoints.device_code,
                &[("client_id", self.client_id()), ("scope", &scope)],
            )
            .await?;
        let body = success_body(Operation::DeviceCode, response).await?;
        let codes: DeviceCodePair = decode(Operation::DeviceCode, &body)?;

        tracing::info!(
            user_code = %codes.user_code,
            verification_url = %codes.verification_url,
            expires_in = codes.expires_in,
            interval = codes.interval,
            "received device and user codes"
        );
        Ok(codes)
    }

    /// Polls the token endpoint until the user grants or denies access, or the codes expire.
    ///
    /// Each poll is preceded by a sleep of the server-provided interval. A response with
    /// `authorization_pending` keeps polling. Any other error kind, including `slow_down` and
    /// `expired_token`, ends the flow with [`AuthError::Denied`]. Once the summed intervals reach
    /// `expires_in`, polling stops with [`AuthError::Timeout`].
    ///
    /// Only the intervals are summed. Time spent waiting for responses is not, so on a slow
    /// network the flow can run somewhat past the nominal expiry.
    #[instrument(skip_all, fields(user_code = %codes.user_code), err)]
    pub async fn wait_for_token(&self, codes: &DeviceCodePair) -> Result<TokenSet, AuthError> {
        let interval = codes.polling_interval();
        let lifetime = codes.lifetime();
        let mut elapsed = Duration::ZERO;
        let mut polls = 0u32;

        while elapsed < lifetime {
            tokio::time::sleep(interval).await;
            polls += 1;

            match self.poll_once(codes).await? {
                PollResponse::Granted(token) => {
                    tracing::info!(polls, "device authorization granted");
                    return Ok(token);
                }
                PollResponse::Error(error) if error.is_pending() => {
                    tracing::debug!(polls, %error, "authorization still pending");
                }
                PollResponse::Error(error) => {
                    tracing::warn!(polls, %error, "device authorization ended with an error");
                    return Err(AuthError::Denied {
                        user_code: codes.user_code.clone(),
                        response: error,
                    });
                }
            }

            elapsed += interval;
        }

        tracing::warn!(polls, "device code expired before authorization completed");
        Err(AuthError::Timeout {
            user_code: codes.user_code.clone(),
            expires_in: codes.expires_in,
        })
    }

    async fn poll_once(&self, codes: &DeviceCodePair) -> Result<PollResponse, AuthError> {
        let response = self
            .post_form(
                Operation::Poll,
                &self.endpoints.token,
                &[
                    ("client_id", self.secrets.client_id.as_str()),
                    ("client_secret", self.secrets.client_secret.as_str()),
                    ("code", codes.device_code.as_str()),
                    ("grant_type", DEVICE_GRANT_TYPE),
                ],
            )
            .await?;

        // Pending polls are answered with 4xx statuses, so only the body tells them apart.
        let body = response.text().await.map_err(|source| AuthError::Transport {
            operation: Operation::Poll,
            source,
        })?;
        decode(Operation::Poll, &body)
    }

    /// Exchanges the refresh token of `token` for a new token set.
    ///
    /// The returned token set is exactly what the server sent; use
    /// [`Credential::superseded_by`] to carry the old refresh token forward.
    #[instrument(skip_all, err)]
    pub async fn refresh(&self, token: &TokenSet) -> Result<TokenSet, AuthError> {
        let Some(refresh_token) = token.refresh_token.as_deref() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Err(AuthError::MissingRefreshToken);
        };

        tracing::debug!("attempting to refresh OAuth token");

        let token_url = TokenUrl::new(self.endpoints.token.clone()).map_err(|e| {
            AuthError::Refresh {
                source: Box::new(e),
            }
        })?;
        // Google expects the client credentials as form fields, not as basic auth.
        let client = BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.secrets.client_secret.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(token_url);

        match client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
        {
            Ok(new_token) => {
                tracing::debug!("successfully refreshed OAuth token");
                Ok(TokenSet::from(new_token))
            }
            Err(oauth2::RequestTokenError::ServerResponse(sr)) => {
                let response = crate::types::ErrorResponse {
                    kind: sr.error().to_string(),
                    description: sr.error_description().cloned(),
                };
                tracing::warn!(%response, "refresh token rejected");
                Err(AuthError::RefreshRejected { response })
            }
            Err(oauth2::RequestTokenError::Request(oauth2::HttpClientError::Reqwest(source))) => {
                Err(AuthError::Transport {
                    operation: Operation::Refresh,
                    source: *source,
                })
            }
            Err(oauth2::RequestTokenError::Parse(source, body)) => {
                tracing::warn!(
                    body = %String::from_utf8_lossy(&body),
                    "token endpoint answered refresh with an unparseable body"
                );
                Err(AuthError::Decode {
                    operation: Operation::Refresh,
                    source: source.into_inner(),
                })
            }
            Err(e) => Err(AuthError::Refresh {
                source: Box::new(e),
            }),
        }
    }

    /// Returns `credential` unchanged while it is valid, or a refreshed replacement once it has
    /// expired.
    ///
    /// A failed refresh is returned as an error. Whether to start a new device authorization
    /// instead is up to the caller.
    pub async fn refresh_if_required(
        &self,
        credential: Credential,
    ) -> Result<Credential, AuthError> {
        if !credential.is_expired() {
            return Ok(credential);
        }

        tracing::debug!(expired_at = %credential.expires_at(), "access token expired");
        let token = self.refresh(&credential.token).await?;
        Ok(credential.superseded_by(token))
    }

    /// Loads the credential stored for `principal`, refreshing it if it has expired.
    ///
    /// A refreshed credential is written back to the store. Returns `None` if nothing is stored.
    #[instrument(skip(self, store), err)]
    pub async fn try_load_stored_credential(
        &self,
        store: &dyn TokenStore,
        principal: &str,
    ) -> Result<Option<Credential>, AuthError> {
        let Some(credential) = store.load(principal)? else {
            tracing::debug!("no stored credential");
            return Ok(None);
        };
        if !credential.is_expired() {
            tracing::debug!("stored credential is still valid");
            return Ok(Some(credential));
        }

        let credential = self.refresh_if_required(credential).await?;
        store.save(principal, &credential)?;
        tracing::info!("refreshed stored credential");
        Ok(Some(credential))
    }

    /// Asks the token-info endpoint whether `token` was issued to `expected_client_id` for
    /// exactly `expected_scopes`.
    ///
    /// The scopes must match as one space-joined string in request order (see
    /// [`TokenInfo::matches`]). This is stricter than usual OAuth scope checks: a token that
    /// grants additional scopes is rejected too. A non-success answer from the endpoint means the
    /// token is not usable and yields `false`.
    #[instrument(skip_all, err)]
    pub async fn validate_token<S: AsRef<str>>(
        &self,
        token: &TokenSet,
        expected_client_id: &str,
        expected_scopes: &[S],
    ) -> Result<bool, AuthError> {
        let response = self
            .post_form(
                Operation::TokenInfo,
                &self.endpoints.token_info,
                &[("access_token", token.access_token.as_str())],
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, %body, "token info request rejected the access token");
            return Ok(false);
        }

        let body = response.text().await.map_err(|source| AuthError::Transport {
            operation: Operation::TokenInfo,
            source,
        })?;
        let info: TokenInfo = decode(Operation::TokenInfo, &body)?;
        let expected_scope = join_scopes(expected_scopes);

        let valid = info.matches(expected_client_id, &expected_scope);
        if valid {
            tracing::debug!("access token validated");
        } else {
            tracing::warn!(
                aud = %info.aud,
                scope = %info.scope,
                %expected_scope,
                "access token audience or scope does not match"
            );
        }
        Ok(valid)
    }

    async fn post_form(
        &self,
        operation: Operation,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response, AuthError> {
        tracing::trace!(%operation, url, "sending request");
        self.http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|source| AuthError::Transport { operation, source })
    }
}

async fn success_body(
    operation: Operation,
    response: reqwest::Response,
) -> Result<String, AuthError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| AuthError::Transport { operation, source })?;
    if !status.is_success() {
        return Err(AuthError::Server {
            operation,
            status,
            body,
        });
    }
    Ok(body)
}

fn decode<T: DeserializeOwned>(operation: Operation, body: &str) -> Result<T, AuthError> {
    serde_json::from_str(body).map_err(|source| AuthError::Decode { operation, source })
}
