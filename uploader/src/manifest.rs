//! The list of videos to upload.
//!
//! A manifest is a text file with one `receiver,path` pair per line:
//!
//! ```text
//! Alice,videos/alice.mp4
//! Bob,videos/bob.mp4
//! ```
//!
//! Blank lines are skipped. Everything after the first comma is the path, and relative paths are
//! resolved against the directory the manifest lives in.

use eyre::{Context, bail};
use std::path::{Path, PathBuf};

/// One item to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDescriptor {
    /// Who the video is for. Used to personalize its title and description.
    pub receiver: String,
    pub path: PathBuf,
}

impl VideoDescriptor {
    pub fn new(receiver: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            receiver: receiver.into(),
            path: path.into(),
        }
    }
}

/// Parses manifest text, resolving relative paths against `base`.
pub fn parse(text: &str, base: &Path) -> eyre::Result<Vec<VideoDescriptor>> {
    let mut descriptors = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_number = index + 1;

        let Some((receiver, path)) = line.split_once(',') else {
            bail!("line {line_number}: expected `receiver,path`, found `{line}`");
        };
        let (receiver, path) = (receiver.trim(), path.trim());
        if receiver.is_empty() {
            bail!("line {line_number}: receiver is empty");
        }
        if path.is_empty() {
            bail!("line {line_number}: path is empty");
        }

        descriptors.push(VideoDescriptor::new(receiver, base.join(path)));
    }
    Ok(descriptors)
}

/// Reads and parses the manifest at `path`.
pub async fn load(path: &Path) -> eyre::Result<Vec<VideoDescriptor>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .wrap_err_with(|| format!("read manifest {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let descriptors =
        parse(&text, base).wrap_err_with(|| format!("parse manifest {}", path.display()))?;
    tracing::debug!(count = descriptors.len(), path = %path.display(), "loaded manifest");
    Ok(descriptors)
}
