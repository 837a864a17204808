//! src/services/upload_service.rs
//!
//! UploadClient: drives one file through the partner's resumable-upload
//! protocol: fetch a signed URL, open a resumable session, then send the file
//! and resume from the last acknowledged byte whenever the remote answers
//! 500 or 503.

use crate::{
    config::AppConfig,
    errors::{Phase, UploadError, UploadResult},
    models::{
        range::{parse_range_header, status_query_content_range, send_content_range},
        request::{AuthorizeBody, UploadRequest},
        session::{UploadOutcome, UploadSession},
        signed_url::SignedUrl,
    },
    services::checksum,
};
use bytes::Bytes;
use reqwest::{
    Body, Client, RequestBuilder, StatusCode,
    header::{
        CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderName, HeaderValue, LOCATION, RANGE,
    },
    redirect,
};
use std::{io::SeekFrom, path::Path};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Vendor header that asks the storage service to open a resumable session.
pub const RESUMABLE_HEADER: &str = "x-goog-resumable";
pub const CONTENT_MD5: &str = "content-md5";

/// The four requests of the protocol. Every request is built from one of these
/// by `UploadClient::build_request`.
#[derive(Debug)]
enum RequestKind<'a> {
    Authorize {
        request: &'a UploadRequest,
    },
    Initiate {
        signed_url: &'a str,
        mime_type: &'a str,
    },
    Send {
        session_uri: &'a str,
        offset: u64,
        size: u64,
        content_md5: Option<&'a str>,
    },
    StatusQuery {
        session_uri: &'a str,
        size: u64,
    },
}

/// Resumable upload client.
///
/// Holds the partner configuration and one HTTP connection pool. Uploads are
/// independent; the client keeps no per-upload state between calls.
#[derive(Clone, Debug)]
pub struct UploadClient {
    http: Client,
    config: AppConfig,
    auth_header: HeaderName,
    auth_value: HeaderValue,
}

impl UploadClient {
    pub fn new(config: AppConfig) -> UploadResult<Self> {
        let auth_header = HeaderName::from_bytes(config.auth_header.as_bytes()).map_err(|_| {
            UploadError::InvalidConfig(format!(
                "invalid auth header name `{}`",
                config.auth_header
            ))
        })?;
        let mut auth_value = HeaderValue::from_str(&config.authorization_value()).map_err(|_| {
            UploadError::InvalidConfig(
                "API key or secret contains invalid header characters".into(),
            )
        })?;
        auth_value.set_sensitive(true);

        // 308 answers a status query; it must reach the upload loop untouched.
        let mut builder = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|err| {
            UploadError::InvalidConfig(format!("failed to create HTTP client: {}", err))
        })?;

        Ok(Self {
            http,
            config,
            auth_header,
            auth_value,
        })
    }

    /// Upload one file end to end.
    ///
    /// Exactly one authorize call and one initiate call are made. Every file
    /// handle opened along the way is owned by this call and released on
    /// every return.
    pub async fn upload(&self, request: &UploadRequest) -> UploadResult<UploadOutcome> {
        let span = info_span!(
            "upload",
            upload_id = %Uuid::new_v4(),
            file = %request.path().display(),
            size = request.size()
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &UploadRequest) -> UploadResult<UploadOutcome> {
        let actual = File::open(request.path()).await?.metadata().await?.len();
        if actual != request.size() {
            return Err(UploadError::SizeMismatch {
                declared: request.size(),
                actual,
            });
        }

        let signed_url = self.authorize(request).await?;
        let session_uri = self.initiate(&signed_url, request.mime_type()).await?;

        let mut session = UploadSession::new(session_uri, request.size());
        let result = self.drive(&mut session, request.path()).await;
        if result.is_err() {
            session.fail();
        }
        debug!(
            status = ?session.status(),
            offset = session.offset(),
            "upload session closed"
        );
        result
    }

    /// Phase 0: trade the partner credentials and record metadata for a signed URL.
    async fn authorize(&self, request: &UploadRequest) -> UploadResult<SignedUrl> {
        info!("Getting signed upload URL.");
        let response = self
            .build_request(RequestKind::Authorize { request })
            .send()
            .await
            .map_err(UploadError::http(Phase::Authorize))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UploadError::AuthorizationFailed { status, body });
        }

        let body = response
            .text()
            .await
            .map_err(UploadError::http(Phase::Authorize))?;
        SignedUrl::from_json(&body)
    }

    /// Phase 1: open the resumable session and return its URI.
    async fn initiate(&self, signed_url: &SignedUrl, mime_type: &str) -> UploadResult<String> {
        info!("Initializing resumable upload.");
        let response = self
            .build_request(RequestKind::Initiate {
                signed_url: &signed_url.url,
                mime_type,
            })
            .send()
            .await
            .map_err(UploadError::http(Phase::Initiate))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            return Err(UploadError::InitiationFailed { status });
        }

        let location = response
            .headers()
            .get(LOCATION)
            .ok_or_else(|| UploadError::protocol(Phase::Initiate, "missing Location header"))?;
        let uri = location.to_str().map_err(|_| {
            UploadError::protocol(Phase::Initiate, "Location header is not valid text")
        })?;

        debug!(session_uri = uri, "resumable session opened");
        Ok(uri.to_string())
    }

    /// Phase 2: send, and on 500/503 query status and resume, until 200 or a fatal answer.
    async fn drive(
        &self,
        session: &mut UploadSession,
        path: &Path,
    ) -> UploadResult<UploadOutcome> {
        let policy = &self.config.retry;
        let mut transient_failures = 0u32;

        info!("Uploading.");
        loop {
            let status = self.send(session, path).await?;

            match status {
                StatusCode::OK => {
                    let outcome = session.complete();
                    info!(
                        bytes = outcome.bytes,
                        resumes = outcome.resumes,
                        "Upload complete."
                    );
                    return Ok(outcome);
                }
                StatusCode::INTERNAL_SERVER_ERROR | StatusCode::SERVICE_UNAVAILABLE => {
                    transient_failures += 1;
                    if !policy.allows(transient_failures) {
                        warn!(
                            attempts = transient_failures,
                            %status,
                            "Upload interrupted, retry budget exhausted."
                        );
                        return Err(UploadError::RetriesExhausted {
                            attempts: transient_failures,
                            last_status: status,
                        });
                    }

                    let delay = policy.backoff_for(transient_failures);
                    warn!(
                        attempt = transient_failures,
                        %status,
                        ?delay,
                        "Upload interrupted. Fetching upload status."
                    );
                    tokio::time::sleep(delay).await;

                    let acknowledged = session.offset();
                    let next = self.query_status(session).await?;
                    session.resume_at(next)?;
                    // Progress since the last status query restarts the budget and the backoff.
                    if session.offset() > acknowledged {
                        transient_failures = 0;
                    }
                    info!(offset = session.offset(), "Upload resuming.");
                }
                other => return Err(UploadError::UploadRejected { status: other }),
            }
        }
    }

    /// Send the file from the session's offset to the end as one request body.
    ///
    /// Each send reads through its own handle, so a body abandoned by an
    /// earlier attempt cannot move this one's position.
    async fn send(&self, session: &UploadSession, path: &Path) -> UploadResult<StatusCode> {
        let offset = session.offset();
        let remaining = session.remaining();

        let (body, content_md5) = if remaining == 0 {
            (Body::from(Bytes::new()), None)
        } else {
            let mut handle = File::open(path).await?;
            handle.seek(SeekFrom::Start(offset)).await?;

            let content_md5 = if self.config.send_content_md5 {
                let digest = checksum::content_md5(&mut (&mut handle).take(remaining)).await?;
                handle.seek(SeekFrom::Start(offset)).await?;
                Some(digest)
            } else {
                None
            };

            let body = Body::wrap_stream(ReaderStream::new(handle.take(remaining)));
            (body, content_md5)
        };

        debug!(offset, remaining, "sending file bytes");
        let response = self
            .build_request(RequestKind::Send {
                session_uri: session.uri(),
                offset,
                size: session.size(),
                content_md5: content_md5.as_deref(),
            })
            .body(body)
            .send()
            .await
            .map_err(UploadError::http(Phase::Upload))?;

        Ok(response.status())
    }

    /// Ask the remote how many bytes it holds; returns the next offset to send.
    async fn query_status(&self, session: &UploadSession) -> UploadResult<u64> {
        let response = self
            .build_request(RequestKind::StatusQuery {
                session_uri: session.uri(),
                size: session.size(),
            })
            .send()
            .await
            .map_err(UploadError::http(Phase::StatusQuery))?;

        let status = response.status();
        if status != StatusCode::PERMANENT_REDIRECT {
            return Err(UploadError::StatusQueryFailed { status });
        }

        let range = response
            .headers()
            .get(RANGE)
            .ok_or_else(|| UploadError::protocol(Phase::StatusQuery, "missing Range header"))?
            .to_str()
            .map_err(|_| {
                UploadError::protocol(Phase::StatusQuery, "Range header is not valid text")
            })?;

        debug!(range, "remote acknowledged range");
        parse_range_header(range)
    }

    /// Single place where protocol headers are spelled out.
    fn build_request(&self, kind: RequestKind<'_>) -> RequestBuilder {
        match kind {
            RequestKind::Authorize { request } => self
                .http
                .post(&self.config.api_url)
                .header(self.auth_header.clone(), self.auth_value.clone())
                .json(&AuthorizeBody::from(request)),
            RequestKind::Initiate {
                signed_url,
                mime_type,
            } => self
                .http
                .post(signed_url)
                .header(CONTENT_LENGTH, 0u64)
                .header(CONTENT_TYPE, mime_type)
                .header(RESUMABLE_HEADER, "start")
                .body(Bytes::new()),
            RequestKind::Send {
                session_uri,
                offset,
                size,
                content_md5,
            } => {
                let mut builder = self
                    .http
                    .put(session_uri)
                    .header(CONTENT_LENGTH, size - offset);
                if let Some(range) = send_content_range(offset, size) {
                    builder = builder.header(CONTENT_RANGE, range);
                }
                if let Some(md5) = content_md5 {
                    builder = builder.header(CONTENT_MD5, md5);
                }
                builder
            }
            RequestKind::StatusQuery { session_uri, size } => self
                .http
                .put(session_uri)
                .header(CONTENT_LENGTH, 0u64)
                .header(CONTENT_RANGE, status_query_content_range(size))
                .body(Bytes::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> UploadClient {
        UploadClient::new(AppConfig::new("https://partner.example/upload_url", "k", "s")).unwrap()
    }

    fn header<'a>(req: &'a reqwest::Request, name: &str) -> Option<&'a str> {
        req.headers().get(name).map(|v| v.to_str().unwrap())
    }

    #[test]
    fn send_request_without_range_on_first_attempt() {
        let req = client()
            .build_request(RequestKind::Send {
                session_uri: "https://upload.example/session",
                offset: 0,
                size: 10,
                content_md5: None,
            })
            .build()
            .unwrap();

        assert_eq!(req.method(), reqwest::Method::PUT);
        assert_eq!(header(&req, "content-length"), Some("10"));
        assert_eq!(header(&req, "content-range"), None);
        assert_eq!(header(&req, "content-md5"), None);
    }

    #[test]
    fn send_request_resumes_with_range_and_md5() {
        let req = client()
            .build_request(RequestKind::Send {
                session_uri: "https://upload.example/session",
                offset: 5,
                size: 10,
                content_md5: Some("abc=="),
            })
            .build()
            .unwrap();

        assert_eq!(header(&req, "content-length"), Some("5"));
        assert_eq!(header(&req, "content-range"), Some("bytes 5-9/10"));
        assert_eq!(header(&req, "content-md5"), Some("abc=="));
    }

    #[test]
    fn status_query_request_is_zero_length() {
        let req = client()
            .build_request(RequestKind::StatusQuery {
                session_uri: "https://upload.example/session",
                size: 10,
            })
            .build()
            .unwrap();

        assert_eq!(req.method(), reqwest::Method::PUT);
        assert_eq!(header(&req, "content-length"), Some("0"));
        assert_eq!(header(&req, "content-range"), Some("bytes */10"));
    }

    #[test]
    fn initiate_request_asks_for_resumable_session() {
        let req = client()
            .build_request(RequestKind::Initiate {
                signed_url: "https://storage.example/signed",
                mime_type: "application/pdf",
            })
            .build()
            .unwrap();

        assert_eq!(req.method(), reqwest::Method::POST);
        assert_eq!(header(&req, "x-goog-resumable"), Some("start"));
        assert_eq!(header(&req, "content-type"), Some("application/pdf"));
        assert_eq!(header(&req, "content-length"), Some("0"));
    }

    #[test]
    fn custom_auth_header_is_used() {
        let mut config = AppConfig::new("https://partner.example/upload_url", "k", "s");
        config.auth_header = "X-Partner-Authorization".into();
        let client = UploadClient::new(config).unwrap();
        assert_eq!(client.auth_header.as_str(), "x-partner-authorization");
        assert!(client.auth_value.is_sensitive());
    }

    #[test]
    fn invalid_auth_header_is_rejected() {
        let mut config = AppConfig::new("https://partner.example/upload_url", "k", "s");
        config.auth_header = "bad header".into();
        assert!(matches!(
            UploadClient::new(config),
            Err(UploadError::InvalidConfig(_))
        ));
    }
}
