//! The resumable upload protocol of the YouTube upload endpoint.
//!
//! An upload session is created with a metadata-only `POST`, which answers with a session URI in
//! its `Location` header. The media is then `PUT` to that URI in chunks, each labelled with a
//! `Content-Range`. The server acknowledges every intermediate chunk with `308 Resume Incomplete`
//! and a `Range` header covering everything it has persisted, and answers the final chunk with the
//! created `video` resource. After an interruption, an empty `PUT` with `Content-Range: bytes
//! */<total>` asks the server how much it kept.
//!
//! See: <https://developers.google.com/youtube/v3/guides/using_resumable_upload_protocol>

use crate::upload::{MediaUpload, ProgressObserver, UploadFailure, UploadProgress, UploadStatus};
use crate::youtube_api::{Video, VideoMetadata, YouTubeClient};
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_RANGE, LOCATION, RANGE};
use http::{HeaderMap, Method, StatusCode};
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::instrument;

/// What the upload endpoint calls "Resume Incomplete".
const RESUME_INCOMPLETE: u16 = 308;

/// One resumable upload of `source` to the endpoint of a [`YouTubeClient`].
pub struct ResumableUpload<'a, R> {
    client: &'a YouTubeClient,
    metadata: VideoMetadata,
    source: R,
    total_bytes: u64,
    chunk_size: usize,
    session_uri: Option<String>,
    /// Bytes the server has confirmed.
    offset: u64,
    video: Option<Video>,
}

impl<'a, R> ResumableUpload<'a, R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    pub fn new(
        client: &'a YouTubeClient,
        metadata: VideoMetadata,
        source: R,
        total_bytes: u64,
        chunk_size: usize,
    ) -> Self {
        Self {
            client,
            metadata,
            source,
            total_bytes,
            chunk_size: chunk_size.max(1),
            session_uri: None,
            offset: 0,
            video: None,
        }
    }

    /// The created video, once the upload has completed.
    pub fn into_video(self) -> Option<Video> {
        self.video
    }

    fn progress(&self, status: UploadStatus) -> UploadProgress {
        UploadProgress::new(status, self.offset, self.total_bytes)
    }

    fn report(&self, observer: &mut ProgressObserver<'_>, status: UploadStatus) {
        observer(&self.progress(status));
    }

    /// Turns the result of an attempt into the progress report that ends it.
    fn conclude(
        &mut self,
        observer: &mut ProgressObserver<'_>,
        result: Result<Video, UploadFailure>,
    ) -> UploadProgress {
        let progress = match result {
            Ok(video) => {
                self.offset = self.total_bytes;
                self.video = Some(video);
                self.progress(UploadStatus::Completed)
            }
            Err(failure) => {
                tracing::debug!(offset = self.offset, error = %failure, "upload attempt failed");
                UploadProgress::failed(failure, self.offset, self.total_bytes)
            }
        };
        observer(&progress);
        progress
    }

    /// Creates the upload session and remembers its URI.
    #[instrument(skip(self), fields(total_bytes = self.total_bytes), err)]
    async fn initiate(&mut self) -> Result<(), UploadFailure> {
        let request = self
            .client
            .authorized_request(Method::POST, self.client.upload_url())
            .await
            .map_err(UploadFailure::Authorization)?;
        let response = request
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header("X-Upload-Content-Type", "video/*")
            .header("X-Upload-Content-Length", self.total_bytes)
            .json(&self.metadata)
            .send()
            .await
            .map_err(UploadFailure::Transport)?;

        if !response.status().is_success() {
            return Err(server_failure(response).await);
        }
        let Some(session_uri) = response
            .headers()
            .get(LOCATION)
            .and_then(|uri| uri.to_str().ok())
        else {
            return Err(UploadFailure::Server {
                status: response.status(),
                message: "upload session created without a Location header".to_string(),
            });
        };

        tracing::debug!(session_uri, "created upload session");
        self.session_uri = Some(session_uri.to_string());
        self.offset = 0;
        Ok(())
    }

    /// Sends `body` to the session URI labelled with `content_range`.
    async fn put(
        &self,
        content_range: String,
        body: Bytes,
    ) -> Result<reqwest::Response, UploadFailure> {
        let Some(session_uri) = self.session_uri.as_deref() else {
            return Err(UploadFailure::Server {
                status: StatusCode::NOT_FOUND,
                message: "no upload session".to_string(),
            });
        };
        self.client
            .authorized_request(Method::PUT, session_uri)
            .await
            .map_err(UploadFailure::Authorization)?
            .header(CONTENT_RANGE, content_range)
            .header(CONTENT_LENGTH, body.len())
            .body(body)
            .send()
            .await
            .map_err(UploadFailure::Transport)
    }

    /// Asks the server how many bytes of the session it has persisted.
    ///
    /// Returns the video if the server already has everything.
    #[instrument(skip(self), err)]
    async fn query_offset(&mut self) -> Result<Option<Video>, UploadFailure> {
        let response = self
            .put(format!("bytes */{}", self.total_bytes), Bytes::new())
            .await?;

        match response.status().as_u16() {
            RESUME_INCOMPLETE => {
                self.offset = persisted_offset(response.headers());
                tracing::debug!(offset = self.offset, "server reported persisted offset");
                Ok(None)
            }
            200 | 201 => Ok(Some(uploaded_video(response).await?)),
            _ => Err(server_failure(response).await),
        }
    }

    /// Sends the rest of the file from the confirmed offset onwards.
    async fn send_chunks(
        &mut self,
        observer: &mut ProgressObserver<'_>,
    ) -> Result<Video, UploadFailure> {
        loop {
            let start = self.offset;
            let remaining = self.total_bytes.saturating_sub(start);
            let len = remaining.min(self.chunk_size as u64);

            // each chunk gets its own buffer; the request body takes ownership of it
            let mut buf = Vec::with_capacity(len as usize);
            self.source
                .seek(SeekFrom::Start(start))
                .await
                .map_err(UploadFailure::Source)?;
            (&mut self.source)
                .take(len)
                .read_to_end(&mut buf)
                .await
                .map_err(UploadFailure::Source)?;
            if buf.len() as u64 != len {
                return Err(UploadFailure::Source(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("source ended {} bytes early", len - buf.len() as u64),
                )));
            }

            let content_range = content_range(start, len, self.total_bytes);
            tracing::trace!(%content_range, "sending chunk");
            let response = self.put(content_range, Bytes::from(buf)).await?;

            match response.status().as_u16() {
                RESUME_INCOMPLETE => {
                    let persisted = persisted_offset(response.headers());
                    if persisted <= start {
                        return Err(UploadFailure::Server {
                            status: StatusCode::PERMANENT_REDIRECT,
                            message: format!("server persisted nothing beyond byte {persisted}"),
                        });
                    }
                    self.offset = persisted.min(self.total_bytes);
                    self.report(observer, UploadStatus::Uploading);
                }
                200 | 201 => return uploaded_video(response).await,
                _ => return Err(server_failure(response).await),
            }
        }
    }
}

impl<R> MediaUpload for ResumableUpload<'_, R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    async fn upload(&mut self, observer: &mut ProgressObserver<'_>) -> UploadProgress {
        self.report(observer, UploadStatus::Starting);
        let result = match self.initiate().await {
            Ok(()) => self.send_chunks(observer).await,
            Err(failure) => Err(failure),
        };
        self.conclude(observer, result)
    }

    async fn resume(&mut self, observer: &mut ProgressObserver<'_>) -> UploadProgress {
        let result = if self.session_uri.is_none() {
            tracing::debug!("no upload session to resume, starting a new one");
            match self.initiate().await {
                Ok(()) => self.send_chunks(observer).await,
                Err(failure) => Err(failure),
            }
        } else {
            match self.query_offset().await {
                Ok(Some(video)) => Ok(video),
                Ok(None) => {
                    self.report(observer, UploadStatus::Uploading);
                    self.send_chunks(observer).await
                }
                Err(failure) => Err(failure),
            }
        };
        self.conclude(observer, result)
    }
}

/// The `Content-Range` of a chunk of `len` bytes starting at `start`.
fn content_range(start: u64, len: u64, total: u64) -> String {
    if len == 0 {
        format!("bytes */{total}")
    } else {
        format!("bytes {start}-{}/{total}", start + len - 1)
    }
}

/// The offset following the last byte covered by a `Range: bytes=0-<n>` header.
///
/// A missing or unreadable header means the server has nothing.
fn persisted_offset(headers: &HeaderMap) -> u64 {
    let Some(range) = headers.get(RANGE) else {
        return 0;
    };
    let last_byte = range
        .to_str()
        .ok()
        .and_then(|range| range.trim().strip_prefix("bytes="))
        .and_then(|range| range.split_once('-'))
        .and_then(|(_, last)| last.trim().parse::<u64>().ok());
    match last_byte {
        Some(last_byte) => last_byte + 1,
        None => {
            tracing::warn!(?range, "ignoring malformed Range header");
            0
        }
    }
}

async fn uploaded_video(response: reqwest::Response) -> Result<Video, UploadFailure> {
    response.json().await.map_err(UploadFailure::Decode)
}

async fn server_failure(response: reqwest::Response) -> UploadFailure {
    let status = response.status();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    UploadFailure::Server { status, message }
}
