use crate::driver::MetadataTemplate;
use crate::youtube_api::PrivacyStatus;
use clap::Parser;
use device_auth::ClientSecrets;
use eyre::{Context, OptionExt};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Upload a list of videos to YouTube, authorizing through a code entered on another device.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The OAuth client secrets downloaded from the Google Cloud console.
    #[arg(long, env = "YTBU_CLIENT_SECRETS", default_value = "client_secret.json")]
    pub client_secrets: PathBuf,

    /// The manifest listing one `receiver,path` pair per line.
    #[arg(long, env = "YTBU_MANIFEST", default_value = "VideosToUpload.txt")]
    pub manifest: PathBuf,

    /// Where authorized credentials are kept between runs.
    #[arg(long, env = "YTBU_TOKEN_DIR", default_value = ".youtube-bulk-upload")]
    pub token_dir: PathBuf,

    /// The name credentials are stored under. Defaults to the current user name.
    #[arg(long, env = "YTBU_PRINCIPAL")]
    pub principal: Option<String>,

    /// Who can see the uploaded videos: private, unlisted or public.
    #[arg(long, env = "YTBU_PRIVACY", default_value_t = PrivacyStatus::Unlisted)]
    pub privacy: PrivacyStatus,

    /// Title of each video. `{receiver}` is replaced with the receiver from the manifest.
    #[arg(long, env = "YTBU_TITLE", default_value = "Hello {receiver}!")]
    pub title: String,

    /// Description of each video. `{receiver}` is replaced with the receiver from the manifest.
    #[arg(long, env = "YTBU_DESCRIPTION", default_value = "A video made for {receiver}.")]
    pub description: String,
}

impl Config {
    /// The name credentials are stored under.
    pub fn principal(&self) -> String {
        self.principal
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "user".to_string())
    }

    pub fn template(&self) -> MetadataTemplate {
        MetadataTemplate {
            title: self.title.clone(),
            description: self.description.clone(),
            privacy: self.privacy,
        }
    }
}

/// The parts of Google's `client_secret.json` that identify the application.
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecretsEntry>,
    web: Option<ClientSecretsEntry>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsEntry {
    client_id: String,
    client_secret: String,
}

/// Reads client secrets in the layout the Google Cloud console downloads them in.
pub async fn load_client_secrets(path: &Path) -> eyre::Result<ClientSecrets> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .wrap_err_with(|| format!("read client secrets {}", path.display()))?;
    parse_client_secrets(&raw)
        .wrap_err_with(|| format!("parse client secrets {}", path.display()))
}

fn parse_client_secrets(raw: &str) -> eyre::Result<ClientSecrets> {
    let file: ClientSecretsFile = serde_json::from_str(raw).context("decode JSON")?;
    let entry = file
        .installed
        .or(file.web)
        .ok_or_eyre("neither an `installed` nor a `web` client is defined")?;
    Ok(ClientSecrets::new(entry.client_id, entry.client_secret))
}
