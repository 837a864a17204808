use crate::{
    models::request::{UploadMetadata, UploadRequest},
    services::retry::{
        DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF, RetryPolicy,
    },
};
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser};
use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

pub const DEFAULT_AUTH_HEADER: &str = "Authorization";
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Centralized client configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    /// Partner endpoint that issues signed upload URLs.
    pub api_url: String,
    pub api_key: String,
    pub api_secret: String,
    /// Header carrying `Key {api_key}:{api_secret}`.
    pub auth_header: String,
    /// Whole-request timeout; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
    /// Send `Content-MD5` of the whole file with every data-carrying PUT.
    pub send_content_md5: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Upload a file through a partner's resumable-upload endpoint")]
pub struct Args {
    /// Partner upload-URL endpoint (overrides UPLOAD_API_URL)
    #[arg(long)]
    pub api_url: Option<String>,

    /// Partner API key (overrides UPLOAD_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Partner API secret (overrides UPLOAD_API_SECRET)
    #[arg(long)]
    pub api_secret: Option<String>,

    /// Header name used for the partner key (overrides UPLOAD_AUTH_HEADER)
    #[arg(long)]
    pub auth_header: Option<String>,

    /// Per-request timeout in seconds, 0 disables it (overrides UPLOAD_TIMEOUT_SECS)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Connect timeout in seconds (overrides UPLOAD_CONNECT_TIMEOUT_SECS)
    #[arg(long)]
    pub connect_timeout_secs: Option<u64>,

    /// Transient failures tolerated before giving up (overrides UPLOAD_MAX_RESUME_ATTEMPTS)
    #[arg(long)]
    pub max_resume_attempts: Option<u32>,

    /// First backoff delay in milliseconds (overrides UPLOAD_INITIAL_BACKOFF_MS)
    #[arg(long)]
    pub initial_backoff_ms: Option<u64>,

    /// Backoff ceiling in milliseconds (overrides UPLOAD_MAX_BACKOFF_MS)
    #[arg(long)]
    pub max_backoff_ms: Option<u64>,

    /// Send a Content-MD5 header with file data
    #[arg(long)]
    pub content_md5: bool,

    #[command(flatten)]
    pub upload: UploadArgs,
}

/// What to upload and how to describe it.
#[derive(ClapArgs, Debug, Clone)]
pub struct UploadArgs {
    /// Path of the file to upload
    #[arg(long)]
    pub file: PathBuf,

    /// MIME type of the file
    #[arg(long)]
    pub mime_type: String,

    /// Patient identifier
    #[arg(long)]
    pub patient_id: String,

    /// Type of record (e.g. MRI)
    #[arg(long = "type")]
    pub record_type: String,

    /// Description of the file
    #[arg(long)]
    pub description: String,

    /// Referring provider NPI
    #[arg(long)]
    pub referring_npi: Option<u64>,

    /// Rendering provider NPI
    #[arg(long)]
    pub rendering_npi: Option<u64>,

    #[arg(long)]
    pub accession_number: Option<String>,

    /// Encounter date (YYYY-MM-DD)
    #[arg(long)]
    pub encounter_date: Option<NaiveDate>,
}

impl UploadArgs {
    /// Stat the file once and turn the flags into an immutable request.
    pub async fn into_request(self) -> Result<UploadRequest> {
        let metadata = UploadMetadata {
            patient_id: self.patient_id,
            description: self.description,
            record_type: self.record_type,
            referring_npi: self.referring_npi,
            rendering_npi: self.rendering_npi,
            accession_number: self.accession_number,
            encounter_date: self.encounter_date,
        };

        UploadRequest::from_path(&self.file, self.mime_type, metadata)
            .await
            .with_context(|| format!("reading {}", self.file.display()))
    }
}

impl AppConfig {
    /// Config with defaults for everything but the partner endpoint and credentials.
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            auth_header: DEFAULT_AUTH_HEADER.into(),
            request_timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            send_content_md5: false,
        }
    }

    /// Parse CLI args + environment variables into AppConfig and the upload flags.
    pub fn from_env_and_args() -> Result<(Self, UploadArgs)> {
        // Parse CLI once
        let args = Args::parse();
        Self::from_sources(args, |key| env::var(key))
    }

    /// Merge parsed args over values looked up with `env`, then defaults.
    pub fn from_sources<F>(args: Args, env: F) -> Result<(Self, UploadArgs)>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        // --- Environment fallback ---
        let env_url = env_string(&env, "UPLOAD_API_URL")?;
        let env_key = env_string(&env, "UPLOAD_API_KEY")?;
        let env_secret = env_string(&env, "UPLOAD_API_SECRET")?;
        let env_header = env_string(&env, "UPLOAD_AUTH_HEADER")?;
        let env_timeout = env_parsed::<u64, _>(&env, "UPLOAD_TIMEOUT_SECS")?;
        let env_connect = env_parsed::<u64, _>(&env, "UPLOAD_CONNECT_TIMEOUT_SECS")?;
        let env_attempts = env_parsed::<u32, _>(&env, "UPLOAD_MAX_RESUME_ATTEMPTS")?;
        let env_initial = env_parsed::<u64, _>(&env, "UPLOAD_INITIAL_BACKOFF_MS")?;
        let env_max = env_parsed::<u64, _>(&env, "UPLOAD_MAX_BACKOFF_MS")?;

        // --- Merge ---
        let api_url = required(args.api_url.or(env_url), "--api-url", "UPLOAD_API_URL")?;
        let api_key = required(args.api_key.or(env_key), "--api-key", "UPLOAD_API_KEY")?;
        let api_secret = required(
            args.api_secret.or(env_secret),
            "--api-secret",
            "UPLOAD_API_SECRET",
        )?;

        let timeout_secs = args
            .timeout_secs
            .or(env_timeout)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let cfg = Self {
            api_url,
            api_key,
            api_secret,
            auth_header: args
                .auth_header
                .or(env_header)
                .unwrap_or_else(|| DEFAULT_AUTH_HEADER.into()),
            request_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            connect_timeout: Duration::from_secs(
                args.connect_timeout_secs
                    .or(env_connect)
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            retry: RetryPolicy {
                max_attempts: args
                    .max_resume_attempts
                    .or(env_attempts)
                    .unwrap_or(DEFAULT_MAX_ATTEMPTS),
                initial_backoff: args
                    .initial_backoff_ms
                    .or(env_initial)
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_INITIAL_BACKOFF),
                max_backoff: args
                    .max_backoff_ms
                    .or(env_max)
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_MAX_BACKOFF),
            },
            send_content_md5: args.content_md5,
        };

        Ok((cfg, args.upload))
    }

    /// Value of the partner auth header.
    pub fn authorization_value(&self) -> String {
        format!("Key {}:{}", self.api_key, self.api_secret)
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("auth_header", &self.auth_header)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("retry", &self.retry)
            .field("send_content_md5", &self.send_content_md5)
            .finish()
    }
}

fn env_string<F>(env: &F, key: &str) -> Result<Option<String>>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    match env(key) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

fn env_parsed<T, F>(env: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Result<String, env::VarError>,
{
    env_string(env, key)?
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", key, value))
        })
        .transpose()
}

fn required(value: Option<String>, flag: &str, var: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("missing {}: pass {} or set {}", var, flag, var))
}
