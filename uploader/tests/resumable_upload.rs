use device_auth::{ClientSecrets, Credential, DeviceAuthClient, Endpoints, TokenSet};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use youtube_bulk_uploader::upload::{
    UploadError, UploadFailure, UploadSession, UploadSettings, UploadStatus,
};
use youtube_bulk_uploader::youtube_api::{PrivacyStatus, VideoMetadata, YouTubeClient};

const UPLOAD_PATH: &str = "/upload/youtube/v3/videos";
const SESSION_PATH: &str = "/upload/youtube/v3/videos/session-1";

fn token(access_token: &str) -> TokenSet {
    TokenSet {
        access_token: access_token.into(),
        refresh_token: Some("1//refresh".into()),
        expires_in: Some(3599),
        token_type: "Bearer".into(),
    }
}

fn youtube(server: &MockServer, credential: Credential) -> YouTubeClient {
    let auth = DeviceAuthClient::new(
        ClientSecrets::new("client-1.apps.googleusercontent.com", "s3cret"),
        reqwest::Client::new(),
    )
    .with_endpoints(Endpoints::rooted_at(&server.uri()));
    YouTubeClient::new(credential, Arc::new(auth), reqwest::Client::new())
        .with_upload_url(format!("{}{UPLOAD_PATH}", server.uri()))
}

fn metadata() -> VideoMetadata {
    VideoMetadata::new("Hello Alice!", "A video made for Alice.", PrivacyStatus::Unlisted)
}

fn write_video(dir: &Path, len: usize) -> (PathBuf, Vec<u8>) {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let path = dir.join("video.mp4");
    std::fs::write(&path, &data).unwrap();
    (path, data)
}

async fn mount_session(server: &MockServer, total: usize, access_token: &str) {
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .and(query_param("uploadType", "resumable"))
        .and(query_param("part", "snippet,status"))
        .and(header("authorization", format!("Bearer {access_token}").as_str()))
        .and(header("x-upload-content-type", "video/*"))
        .and(header("x-upload-content-length", total.to_string().as_str()))
        .and(body_string_contains("\"privacyStatus\":\"unlisted\""))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Location", format!("{}{SESSION_PATH}", server.uri()).as_str()),
        )
        .expect(1)
        .mount(server)
        .await;
}

fn incomplete(last_byte: usize) -> ResponseTemplate {
    ResponseTemplate::new(308).insert_header("Range", format!("bytes=0-{last_byte}").as_str())
}

fn created(id: &str) -> ResponseTemplate {
    ResponseTemplate::new(201).set_body_json(json!({
        "kind": "youtube#video",
        "id": id,
        "snippet": { "title": "Hello Alice!", "description": "A video made for Alice." },
        "status": { "uploadStatus": "uploaded", "privacyStatus": "unlisted" }
    }))
}

async fn mount_chunk(server: &MockServer, content_range: &str, response: ResponseTemplate) {
    Mock::given(method("PUT"))
        .and(path(SESSION_PATH))
        .and(header("content-range", content_range))
        .respond_with(response)
        .up_to_n_times(1)
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn ten_megabytes_upload_in_five_chunks() {
    const TOTAL: usize = 10 * 1024 * 1024;
    const CHUNK: usize = 2_097_152;

    let server = MockServer::start().await;
    mount_session(&server, TOTAL, "ya29.upload").await;
    for chunk in 0..4 {
        let (first, last) = (chunk * CHUNK, (chunk + 1) * CHUNK - 1);
        mount_chunk(
            &server,
            &format!("bytes {first}-{last}/{TOTAL}"),
            incomplete(last),
        )
        .await;
    }
    mount_chunk(
        &server,
        &format!("bytes {}-{}/{TOTAL}", 4 * CHUNK, TOTAL - 1),
        created("vid-10mb"),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let (path, data) = write_video(dir.path(), TOTAL);
    let client = youtube(&server, Credential::new(token("ya29.upload")));
    let session = UploadSession::new(&client, UploadSettings::default());

    let mut seen = Vec::new();
    let outcome = session
        .start(&path, &metadata(), &mut |progress| {
            seen.push((progress.status, progress.bytes_sent))
        })
        .await
        .unwrap();

    assert_eq!(outcome.video_id, "vid-10mb");
    assert_eq!(outcome.url, "https://youtu.be/vid-10mb");
    assert_eq!(outcome.bytes_sent, TOTAL as u64);
    assert_eq!(
        seen,
        vec![
            (UploadStatus::Starting, 0),
            (UploadStatus::Uploading, 2_097_152),
            (UploadStatus::Uploading, 4_194_304),
            (UploadStatus::Uploading, 6_291_456),
            (UploadStatus::Uploading, 8_388_608),
            (UploadStatus::Completed, TOTAL as u64),
        ]
    );

    let requests = server.received_requests().await.unwrap();
    let chunks: Vec<_> = requests
        .iter()
        .filter(|request| request.method.as_str() == "PUT")
        .collect();
    assert_eq!(chunks.len(), 5);
    assert!(chunks.iter().all(|chunk| chunk.body.len() == CHUNK));
    assert_eq!(chunks[4].body, data[4 * CHUNK..]);
}

#[tokio::test]
async fn interrupted_upload_resumes_from_persisted_offset() {
    const TOTAL: usize = 600_000;

    let server = MockServer::start().await;
    mount_session(&server, TOTAL, "ya29.upload").await;
    mount_chunk(&server, "bytes 0-262143/600000", incomplete(262_143)).await;
    mount_chunk(
        &server,
        "bytes 262144-524287/600000",
        ResponseTemplate::new(503).set_body_string("backend error"),
    )
    .await;
    mount_chunk(&server, "bytes */600000", incomplete(262_143)).await;
    mount_chunk(&server, "bytes 262144-524287/600000", incomplete(524_287)).await;
    mount_chunk(&server, "bytes 524288-599999/600000", created("vid-resumed")).await;

    let dir = tempfile::tempdir().unwrap();
    let (path, _) = write_video(dir.path(), TOTAL);
    let client = youtube(&server, Credential::new(token("ya29.upload")));
    let settings = UploadSettings {
        chunk_size: 256 * 1024,
        resume_delay: Duration::from_millis(10),
        ..UploadSettings::default()
    };
    let session = UploadSession::new(&client, settings);

    let mut statuses = Vec::new();
    let outcome = session
        .start(&path, &metadata(), &mut |progress| {
            statuses.push(progress.status)
        })
        .await
        .unwrap();

    assert_eq!(outcome.url, "https://youtu.be/vid-resumed");
    assert_eq!(outcome.bytes_sent, TOTAL as u64);
    assert!(statuses.contains(&UploadStatus::Failed));
    assert_eq!(statuses.last(), Some(&UploadStatus::Completed));
}

#[tokio::test]
async fn rejected_initiation_is_not_resumed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "message": "The request cannot be completed because you have exceeded your quota." }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (path, _) = write_video(dir.path(), 1000);
    let client = youtube(&server, Credential::new(token("ya29.upload")));
    let session = UploadSession::new(&client, UploadSettings::default());

    let err = session
        .start(&path, &metadata(), &mut |_| {})
        .await
        .unwrap_err();
    match err {
        UploadError::Fatal {
            failure: UploadFailure::Server { status, message },
        } => {
            assert_eq!(status.as_u16(), 403);
            assert!(message.contains("quota"), "{message}");
        }
        other => panic!("expected fatal failure, got {other:?}"),
    }
}

#[tokio::test]
async fn expired_credential_is_refreshed_before_uploading() {
    const TOTAL: usize = 1000;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v4/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.refreshed",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_session(&server, TOTAL, "ya29.refreshed").await;
    Mock::given(method("PUT"))
        .and(path(SESSION_PATH))
        .and(header("authorization", "Bearer ya29.refreshed"))
        .and(header("content-range", "bytes 0-999/1000"))
        .respond_with(created("vid-refreshed"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (path, _) = write_video(dir.path(), TOTAL);
    let client = youtube(&server, Credential::expired(token("ya29.stale")));
    let session = UploadSession::new(&client, UploadSettings::default());

    let outcome = session
        .start(&path, &metadata(), &mut |_| {})
        .await
        .unwrap();
    assert_eq!(outcome.video_id, "vid-refreshed");

    let credential = client.credential().await;
    assert_eq!(credential.access_token(), "ya29.refreshed");
    assert_eq!(credential.token.refresh_token.as_deref(), Some("1//refresh"));
}

#[tokio::test]
async fn missing_source_file_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = youtube(&server, Credential::new(token("ya29.upload")));
    let session = UploadSession::new(&client, UploadSettings::default());

    let err = session
        .start(Path::new("/no/such/video.mp4"), &metadata(), &mut |_| {})
        .await
        .unwrap_err();
    match err {
        UploadError::Open { path, .. } => assert_eq!(path, PathBuf::from("/no/such/video.mp4")),
        other => panic!("expected open failure, got {other:?}"),
    }
}
