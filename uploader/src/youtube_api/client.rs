//! Authenticated access to the YouTube upload endpoint.

use device_auth::{AuthError, Credential, DeviceAuthClient};
use http::Method;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// Where `videos.insert` accepts media uploads.
pub const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";

/// Client for the YouTube Data API v3 upload endpoint.
///
/// The client holds the credential the batch was authorized with and refreshes it through the
/// shared [`DeviceAuthClient`] whenever it expires, so long uploads can outlive the access token
/// they started with. Clones share both the credential and the HTTP connection pool.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    credential: Arc<Mutex<Credential>>,
    auth: Arc<DeviceAuthClient>,
    client: reqwest::Client,
    upload_url: String,
}

impl YouTubeClient {
    pub fn new(
        credential: Credential,
        auth: Arc<DeviceAuthClient>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            credential: Arc::new(Mutex::new(credential)),
            auth,
            client,
            upload_url: UPLOAD_URL.to_string(),
        }
    }

    /// Sends uploads somewhere other than YouTube, e.g. to a mock server.
    pub fn with_upload_url(mut self, upload_url: impl Into<String>) -> Self {
        self.upload_url = upload_url.into();
        self
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    /// Returns a copy of the current credential.
    ///
    /// It may differ from the one the client was created with if it had to be refreshed, so this
    /// is what should be written back to the token store.
    pub async fn credential(&self) -> Credential {
        self.credential.lock().await.clone()
    }

    /// Gets an access token that is not about to expire, refreshing it if necessary.
    #[instrument(skip(self), level = tracing::Level::TRACE, err)]
    pub(crate) async fn fresh_access_token(&self) -> Result<String, AuthError> {
        let mut credential = self.credential.lock().await;

        if credential.is_expired() {
            tracing::debug!("access token expired, attempting refresh");
            let refreshed = self.auth.refresh_if_required(credential.clone()).await?;
            *credential = refreshed;
            tracing::debug!("access token successfully refreshed");
        }

        Ok(credential.access_token().to_string())
    }

    /// Starts a request to `url` that carries a fresh bearer token.
    pub(crate) async fn authorized_request(
        &self,
        method: Method,
        url: &str,
    ) -> Result<reqwest::RequestBuilder, AuthError> {
        let access_token = self.fresh_access_token().await?;
        Ok(self
            .client
            .request(method, url)
            .header("Authorization", format!("Bearer {access_token}")))
    }
}
