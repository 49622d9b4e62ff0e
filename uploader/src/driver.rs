//! Authorizes once and uploads every video of a manifest.

use crate::UPLOAD_SCOPE;
use crate::manifest::VideoDescriptor;
use crate::upload::{UploadOutcome, UploadProgress, UploadSession, UploadSettings, UploadStatus};
use crate::youtube_api::{PrivacyStatus, UPLOAD_URL, VideoMetadata, YouTubeClient};
use device_auth::{Credential, DeviceAuthClient, DeviceCodePair, TokenStore};
use eyre::{Context, bail};
use std::ops::AsyncFnMut;
use std::sync::Arc;
use tracing::Instrument;

/// Placeholder replaced with the receiver of a video.
const RECEIVER_PLACEHOLDER: &str = "{receiver}";

/// How each video's title, description and visibility are derived from its receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTemplate {
    pub title: String,
    pub description: String,
    pub privacy: PrivacyStatus,
}

impl Default for MetadataTemplate {
    fn default() -> Self {
        Self {
            title: "Hello {receiver}!".to_string(),
            description: "A video made for {receiver}.".to_string(),
            privacy: PrivacyStatus::Unlisted,
        }
    }
}

impl MetadataTemplate {
    pub fn render(&self, receiver: &str) -> VideoMetadata {
        VideoMetadata::new(
            self.title.replace(RECEIVER_PLACEHOLDER, receiver),
            self.description.replace(RECEIVER_PLACEHOLDER, receiver),
            self.privacy,
        )
    }
}

/// What happened to one manifest entry.
#[derive(Debug)]
pub enum ItemResult {
    Uploaded {
        descriptor: VideoDescriptor,
        outcome: UploadOutcome,
    },
    Failed {
        descriptor: VideoDescriptor,
        error: eyre::Report,
    },
}

impl ItemResult {
    pub fn descriptor(&self) -> &VideoDescriptor {
        match self {
            ItemResult::Uploaded { descriptor, .. } | ItemResult::Failed { descriptor, .. } => {
                descriptor
            }
        }
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self, ItemResult::Uploaded { .. })
    }
}

/// The results of a batch, in manifest order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<ItemResult>,
}

impl BatchReport {
    pub fn uploaded(&self) -> usize {
        self.items.iter().filter(|item| item.is_uploaded()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.uploaded()
    }

    pub fn all_uploaded(&self) -> bool {
        self.failed() == 0
    }
}

/// The line reported to the user for a completed upload.
pub fn success_message(descriptor: &VideoDescriptor, outcome: &UploadOutcome) -> String {
    format!(
        "Video for {} uploaded successfully: {}",
        descriptor.receiver, outcome.url
    )
}

/// Logs upload progress in kilobytes.
fn log_progress(progress: &UploadProgress) {
    let sent_kb = progress.bytes_sent / 1024;
    let total_kb = progress.total_bytes / 1024;
    match progress.status {
        UploadStatus::NotStarted => {}
        UploadStatus::Starting => tracing::info!(total_kb, "starting upload"),
        UploadStatus::Uploading => tracing::info!(sent_kb, total_kb, "{sent_kb} KB uploaded"),
        UploadStatus::Completed => tracing::debug!(sent_kb, "all bytes uploaded"),
        UploadStatus::Failed => tracing::warn!(
            sent_kb,
            error = progress.failure.as_ref().map(tracing::field::display),
            "upload attempt failed"
        ),
    }
}

/// Uploads a batch of videos under one authorization.
#[derive(Clone)]
pub struct BulkUploadDriver {
    auth: Arc<DeviceAuthClient>,
    store: Arc<dyn TokenStore>,
    principal: String,
    http: reqwest::Client,
    template: MetadataTemplate,
    settings: UploadSettings,
    upload_url: String,
}

impl BulkUploadDriver {
    pub fn new(
        auth: DeviceAuthClient,
        store: Arc<dyn TokenStore>,
        principal: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            auth: Arc::new(auth),
            store,
            principal: principal.into(),
            http,
            template: MetadataTemplate::default(),
            settings: UploadSettings::default(),
            upload_url: UPLOAD_URL.to_string(),
        }
    }

    pub fn with_template(mut self, template: MetadataTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_settings(mut self, settings: UploadSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_upload_url(mut self, upload_url: impl Into<String>) -> Self {
        self.upload_url = upload_url.into();
        self
    }

    /// Obtains a credential for the batch.
    ///
    /// A stored credential is used when there is one, refreshed first if it has expired. If
    /// nothing is stored, or the stored credential can no longer be refreshed, the user is taken
    /// through device authorization: `prompt` is shown the verification URL and user code before
    /// polling starts, and the resulting token is validated and stored.
    pub async fn authenticate<F>(&self, mut prompt: F) -> eyre::Result<Credential>
    where
        F: AsyncFnMut(&DeviceCodePair),
    {
        // ==============================================================================
        // Stored Credential
        // ==============================================================================
        // A credential from an earlier run saves the user from entering a code again.
        match self
            .auth
            .try_load_stored_credential(&*self.store, &self.principal)
            .await
        {
            Ok(Some(credential)) => {
                tracing::info!(principal = %self.principal, "using stored credential");
                return Ok(credential);
            }
            Ok(None) => {
                tracing::info!(principal = %self.principal, "no stored credential");
            }
            Err(e) if e.is_refresh_failure() => {
                tracing::warn!(
                    principal = %self.principal,
                    error = %e,
                    "stored credential could not be refreshed, re-authorizing"
                );
            }
            Err(e) => return Err(e).wrap_err("load stored credential"),
        }

        // ==============================================================================
        // Device Authorization
        // ==============================================================================
        // The user completes the grant on another device while we poll.
        let codes = self
            .auth
            .request_codes(&[UPLOAD_SCOPE])
            .await
            .wrap_err("request device authorization codes")?;
        prompt(&codes).await;

        let token = self
            .auth
            .wait_for_token(&codes)
            .await
            .wrap_err("wait for device authorization")?;

        let valid = self
            .auth
            .validate_token(&token, self.auth.client_id(), &[UPLOAD_SCOPE])
            .await
            .wrap_err("validate access token")?;
        if !valid {
            bail!("access token was not issued to this client for the upload scope");
        }

        let credential = Credential::new(token);
        self.store
            .save(&self.principal, &credential)
            .wrap_err("save credential")?;
        tracing::info!(principal = %self.principal, "authorized and saved credential");
        Ok(credential)
    }

    /// Uploads every descriptor in order.
    ///
    /// Each upload either succeeds or is recorded as failed; one failure does not stop the
    /// remaining uploads. If the credential was refreshed along the way, the refreshed one is
    /// stored once the batch is done.
    pub async fn run(
        &self,
        descriptors: &[VideoDescriptor],
        credential: Credential,
    ) -> BatchReport {
        let client = YouTubeClient::new(credential, Arc::clone(&self.auth), self.http.clone())
            .with_upload_url(self.upload_url.as_str());
        let session = UploadSession::new(&client, self.settings.clone());
        let total = descriptors.len();
        let mut report = BatchReport::default();

        for (index, descriptor) in descriptors.iter().enumerate() {
            let span = tracing::info_span!(
                "upload",
                item = index + 1,
                of = total,
                receiver = %descriptor.receiver
            );
            let metadata = self.template.render(&descriptor.receiver);
            let result = session
                .start(&descriptor.path, &metadata, &mut log_progress)
                .instrument(span)
                .await;

            let item = match result {
                Ok(outcome) => ItemResult::Uploaded {
                    descriptor: descriptor.clone(),
                    outcome,
                },
                Err(e) => {
                    let error = eyre::Report::new(e).wrap_err(format!(
                        "upload video for {} from {}",
                        descriptor.receiver,
                        descriptor.path.display()
                    ));
                    tracing::error!(error = ?error, "upload failed, continuing with next video");
                    ItemResult::Failed {
                        descriptor: descriptor.clone(),
                        error,
                    }
                }
            };
            report.items.push(item);
        }

        let credential = client.credential().await;
        if let Err(e) = self.store.save(&self.principal, &credential) {
            tracing::warn!(error = %e, "failed to save credential after batch");
        }

        tracing::info!(
            uploaded = report.uploaded(),
            failed = report.failed(),
            "batch finished"
        );
        report
    }
}
