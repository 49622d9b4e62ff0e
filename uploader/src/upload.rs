//! Single-video upload sessions and their resume policy.

use crate::youtube_api::resumable::ResumableUpload;
use crate::youtube_api::{VideoMetadata, YouTubeClient};
use device_auth::AuthError;
use http::StatusCode;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

/// Bytes sent per chunk request. The upload endpoint requires a multiple of 256 KiB.
pub const CHUNK_SIZE: usize = 8 * 256 * 1024;

/// How long to wait before each resume attempt.
pub const RESUME_DELAY: Duration = Duration::from_secs(3);

/// How many times an interrupted upload is resumed before giving up.
pub const MAX_RESUME_ATTEMPTS: u32 = 3;

/// Prefix of the public short link for an uploaded video.
pub const VIDEO_URL_PREFIX: &str = "https://youtu.be/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    pub chunk_size: usize,
    pub resume_delay: Duration,
    pub max_resume_attempts: u32,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            resume_delay: RESUME_DELAY,
            max_resume_attempts: MAX_RESUME_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    NotStarted,
    Starting,
    Uploading,
    Completed,
    Failed,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UploadStatus::NotStarted => "not started",
            UploadStatus::Starting => "starting",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        })
    }
}

/// A snapshot of an upload, reported at every state change and chunk boundary.
#[derive(Debug)]
pub struct UploadProgress {
    pub status: UploadStatus,
    /// Bytes the server has confirmed so far.
    pub bytes_sent: u64,
    pub total_bytes: u64,
    /// Why the upload failed. Only set when `status` is [`UploadStatus::Failed`].
    pub failure: Option<UploadFailure>,
}

impl UploadProgress {
    pub fn new(status: UploadStatus, bytes_sent: u64, total_bytes: u64) -> Self {
        Self {
            status,
            bytes_sent,
            total_bytes,
            failure: None,
        }
    }

    pub fn failed(failure: UploadFailure, bytes_sent: u64, total_bytes: u64) -> Self {
        Self {
            status: UploadStatus::Failed,
            bytes_sent,
            total_bytes,
            failure: Some(failure),
        }
    }
}

/// Receives every [`UploadProgress`] report. It only observes and cannot steer the upload.
pub type ProgressObserver<'a> = dyn FnMut(&UploadProgress) + Send + 'a;

/// Why a single upload request did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum UploadFailure {
    /// The request never produced a response.
    #[error("upload request did not complete")]
    Transport(#[source] reqwest::Error),

    /// The upload endpoint answered with an unexpected status.
    #[error("upload endpoint answered {status}: {message}")]
    Server { status: StatusCode, message: String },

    /// The endpoint claimed success but sent no usable `video` resource.
    #[error("parse uploaded video resource")]
    Decode(#[source] reqwest::Error),

    #[error("read source file")]
    Source(#[source] std::io::Error),

    #[error("obtain access token")]
    Authorization(#[source] AuthError),
}

impl UploadFailure {
    /// Whether retrying from the last confirmed offset may succeed.
    ///
    /// Failures without a server status are transient. Client errors are not, and neither are
    /// server errors other than 500, 502, 503 and 504. Local failures (the source file, the
    /// credential, an unreadable response) are never worth resuming.
    pub fn is_resumable(&self) -> bool {
        match self {
            UploadFailure::Transport(_) => true,
            UploadFailure::Server { status, .. } => {
                if status.is_client_error() {
                    false
                } else if status.is_server_error() {
                    matches!(status.as_u16(), 500 | 502 | 503 | 504)
                } else {
                    true
                }
            }
            UploadFailure::Decode(_)
            | UploadFailure::Source(_)
            | UploadFailure::Authorization(_) => false,
        }
    }
}

/// Whether `progress` reports a failure that a resume attempt may recover from.
pub fn is_resumable(progress: &UploadProgress) -> bool {
    progress.status == UploadStatus::Failed
        && progress
            .failure
            .as_ref()
            .is_none_or(UploadFailure::is_resumable)
}

/// An upload that can be started once and resumed after a failure.
///
/// Implementations report progress to the observer and return the final state of the attempt
/// instead of an error, so that the caller can decide whether to resume.
#[allow(async_fn_in_trait)]
pub trait MediaUpload {
    async fn upload(&mut self, observer: &mut ProgressObserver<'_>) -> UploadProgress;
    async fn resume(&mut self, observer: &mut ProgressObserver<'_>) -> UploadProgress;
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("open {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload failed and cannot be resumed")]
    Fatal {
        #[source]
        failure: UploadFailure,
    },

    #[error("upload still failing after {attempts} resume attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Option<UploadFailure>,
    },

    #[error("upload ended in unexpected state `{status}` during {phase}")]
    UnexpectedState {
        phase: &'static str,
        status: UploadStatus,
    },
}

/// Runs `upload` to completion, resuming after resumable failures.
///
/// Each resume waits `settings.resume_delay` first. After `settings.max_resume_attempts`
/// resumes that all fail, the upload is abandoned with [`UploadError::Exhausted`].
pub async fn drive<U: MediaUpload>(
    upload: &mut U,
    settings: &UploadSettings,
    observer: &mut ProgressObserver<'_>,
) -> Result<UploadProgress, UploadError> {
    let mut progress = upload.upload(observer).await;
    let mut attempts = 0;

    loop {
        let phase = if attempts == 0 { "upload" } else { "resume" };
        match progress.status {
            UploadStatus::Completed => return Ok(progress),
            UploadStatus::Failed => {
                match progress.failure {
                    Some(failure) if !failure.is_resumable() => {
                        tracing::error!(phase, error = %failure, "upload failed permanently");
                        return Err(UploadError::Fatal { failure });
                    }
                    last if attempts >= settings.max_resume_attempts => {
                        return Err(UploadError::Exhausted { attempts, last });
                    }
                    last => {
                        attempts += 1;
                        tracing::warn!(
                            attempt = attempts,
                            max_attempts = settings.max_resume_attempts,
                            bytes_sent = progress.bytes_sent,
                            error = last.as_ref().map(tracing::field::display),
                            "upload interrupted, resuming"
                        );
                        tokio::time::sleep(settings.resume_delay).await;
                        progress = upload.resume(observer).await;
                    }
                }
            }
            status => return Err(UploadError::UnexpectedState { phase, status }),
        }
    }
}

/// The result of one completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub video_id: String,
    pub url: String,
    pub bytes_sent: u64,
}

impl UploadOutcome {
    pub fn new(video_id: impl Into<String>, bytes_sent: u64) -> Self {
        let video_id = video_id.into();
        Self {
            url: format!("{VIDEO_URL_PREFIX}{video_id}"),
            video_id,
            bytes_sent,
        }
    }
}

/// Uploads single files through one [`YouTubeClient`].
#[derive(Debug, Clone)]
pub struct UploadSession<'a> {
    client: &'a YouTubeClient,
    settings: UploadSettings,
}

impl<'a> UploadSession<'a> {
    pub fn new(client: &'a YouTubeClient, settings: UploadSettings) -> Self {
        Self { client, settings }
    }

    /// Uploads the file at `path` as a new video described by `metadata`.
    ///
    /// The file stays open for the duration of the call and nothing else reads from it.
    #[instrument(skip(self, path, metadata, observer), fields(path = %path.display()), err)]
    pub async fn start(
        &self,
        path: &Path,
        metadata: &VideoMetadata,
        observer: &mut ProgressObserver<'_>,
    ) -> Result<UploadOutcome, UploadError> {
        let open_error = |source| UploadError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(open_error)?;
        let total_bytes = file.metadata().await.map_err(open_error)?.len();
        tracing::debug!(total_bytes, "opened source file");

        let mut upload = ResumableUpload::new(
            self.client,
            metadata.clone(),
            file,
            total_bytes,
            self.settings.chunk_size,
        );
        let progress = drive(&mut upload, &self.settings, observer).await?;

        let Some(video) = upload.into_video() else {
            return Err(UploadError::UnexpectedState {
                phase: "completion",
                status: progress.status,
            });
        };
        let outcome = UploadOutcome::new(video.id, progress.bytes_sent);
        tracing::info!(video_id = %outcome.video_id, url = %outcome.url, "upload completed");
        Ok(outcome)
    }
}
