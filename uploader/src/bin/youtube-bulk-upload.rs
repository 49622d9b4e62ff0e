use clap::Parser;
use device_auth::{DeviceAuthClient, JsonFileTokenStore};
use eyre::Context;
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_bulk_uploader::config::load_client_secrets;
use youtube_bulk_uploader::{BulkUploadDriver, Config, ItemResult, manifest, success_message};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let config = Config::parse();

    let secrets = load_client_secrets(&config.client_secrets).await?;
    let descriptors = manifest::load(&config.manifest).await?;
    if descriptors.is_empty() {
        tracing::warn!(manifest = %config.manifest.display(), "no videos to upload");
        return Ok(());
    }

    let http = reqwest::ClientBuilder::new()
        // SSRF no thank you.
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("build HTTP client")?;

    let driver = BulkUploadDriver::new(
        DeviceAuthClient::new(secrets, http.clone()),
        Arc::new(JsonFileTokenStore::new(&config.token_dir)),
        config.principal(),
        http,
    )
    .with_template(config.template());

    let credential = driver
        .authenticate(async |codes| {
            eprintln!("==> {codes}");
            eprintln!("    waiting for authorization...");
        })
        .await?;

    let report = driver.run(&descriptors, credential).await;
    for item in &report.items {
        match item {
            ItemResult::Uploaded {
                descriptor,
                outcome,
            } => println!("{}", success_message(descriptor, outcome)),
            ItemResult::Failed { error, .. } => eprintln!("Error: {error:?}"),
        }
    }

    if !report.all_uploaded() {
        eyre::bail!(
            "{} of {} uploads failed",
            report.failed(),
            report.items.len()
        );
    }
    Ok(())
}
