//! YouTube Data API v3 upload support.
//!
//! Videos are created with `videos.insert` through the resumable upload protocol, which lets an
//! interrupted transfer continue from the last byte the server acknowledged instead of starting
//! over. [`YouTubeClient`] owns the authorization for those requests, [`resumable`] speaks the
//! protocol, and [`videos`] holds the resource types sent and received.

pub mod client;
pub mod resumable;
pub mod videos;

pub use client::{UPLOAD_URL, YouTubeClient};
pub use resumable::ResumableUpload;
pub use videos::{
    PrivacyStatus, UploadedVideoStatus, Video, VideoMetadata, VideoSnippet, VideoStatus,
};
