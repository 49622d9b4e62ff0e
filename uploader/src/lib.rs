//! Bulk uploads of personalized videos to YouTube.
//!
//! A [`BulkUploadDriver`] authorizes once through the OAuth 2.0 device authorization grant, then
//! uploads every entry of a [`manifest`] with an [`UploadSession`](upload::UploadSession), which
//! resumes interrupted transfers a bounded number of times. A failed entry is recorded in the
//! [`BatchReport`] and the batch moves on.

pub mod config;
pub mod driver;
pub mod manifest;
pub mod upload;
pub mod youtube_api;

pub use config::Config;
pub use driver::{BatchReport, BulkUploadDriver, ItemResult, MetadataTemplate, success_message};
pub use manifest::VideoDescriptor;

/// The only scope the uploader asks for.
pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";
