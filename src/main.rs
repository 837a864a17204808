use anyhow::{Context, Result};
use resumable_upload::{AppConfig, UploadClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + upload flags ---
    let (cfg, upload) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting resumable-upload with config: {:?}", cfg);

    // --- Describe the file once, up front ---
    let request = upload.into_request().await?;
    tracing::debug!(
        "Upload request => {} ({} bytes, {})",
        request.path().display(),
        request.size(),
        request.mime_type()
    );

    // --- Run the upload ---
    let client = UploadClient::new(cfg).context("building upload client")?;
    let outcome = match client.upload(&request).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(
                phase = ?err.phase(),
                status = ?err.status(),
                "Upload failed: {}",
                err
            );
            return Err(anyhow::Error::new(err)
                .context(format!("uploading {}", request.path().display())));
        }
    };

    tracing::info!(
        "Uploaded {} bytes ({} resumes)",
        outcome.bytes,
        outcome.resumes
    );
    tracing::debug!("Session URI => {}", outcome.session_uri);

    Ok(())
}
