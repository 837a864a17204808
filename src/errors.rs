use reqwest::StatusCode;
use std::{fmt, io};
use thiserror::Error;

/// The protocol step an error was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fetching the signed URL from the partner endpoint.
    Authorize,
    /// Opening the resumable session against the signed URL.
    Initiate,
    /// Sending file bytes to the session URI.
    Upload,
    /// Probing the session URI for the acknowledged offset.
    StatusQuery,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Authorize => "authorize",
            Phase::Initiate => "initiate",
            Phase::Upload => "upload",
            Phase::StatusQuery => "status query",
        };
        f.write_str(name)
    }
}

/// Every way a single upload can end without success.
///
/// All variants are terminal. The only statuses the client recovers from on
/// its own (500 and 503 while sending bytes) never surface here unless the
/// retry budget runs out.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed getting signed upload URL. HTTP status: {status}, body: {body}")]
    AuthorizationFailed { status: StatusCode, body: String },

    #[error("upload failed to initiate. HTTP status: {status}")]
    InitiationFailed { status: StatusCode },

    #[error("upload failed. HTTP status: {status}")]
    UploadRejected { status: StatusCode },

    #[error("upload failed to get status. HTTP status: {status}")]
    StatusQueryFailed { status: StatusCode },

    #[error("protocol violation during {phase}: {detail}")]
    ProtocolViolation { phase: Phase, detail: String },

    #[error("upload gave up after {attempts} transient failures (last HTTP status: {last_status})")]
    RetriesExhausted { attempts: u32, last_status: StatusCode },

    #[error("file size changed: declared {declared} bytes, found {actual} bytes")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP transport error during {phase}")]
    Http {
        phase: Phase,
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type UploadResult<T> = Result<T, UploadError>;

impl UploadError {
    pub fn protocol(phase: Phase, detail: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            phase,
            detail: detail.into(),
        }
    }

    /// Adapter for `map_err` on a reqwest future.
    pub fn http(phase: Phase) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Http { phase, source }
    }

    /// The protocol phase this error belongs to, if it came from the network side.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            UploadError::AuthorizationFailed { .. } => Some(Phase::Authorize),
            UploadError::InitiationFailed { .. } => Some(Phase::Initiate),
            UploadError::UploadRejected { .. } | UploadError::RetriesExhausted { .. } => {
                Some(Phase::Upload)
            }
            UploadError::StatusQueryFailed { .. } => Some(Phase::StatusQuery),
            UploadError::ProtocolViolation { phase, .. } | UploadError::Http { phase, .. } => {
                Some(*phase)
            }
            UploadError::SizeMismatch { .. }
            | UploadError::InvalidConfig(_)
            | UploadError::Io(_) => None,
        }
    }

    /// HTTP status observed when the remote answered with something unexpected.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            UploadError::AuthorizationFailed { status, .. }
            | UploadError::InitiationFailed { status }
            | UploadError::UploadRejected { status }
            | UploadError::StatusQueryFailed { status } => Some(*status),
            UploadError::RetriesExhausted { last_status, .. } => Some(*last_status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_failure_mentions_status_and_body() {
        let err = UploadError::AuthorizationFailed {
            status: StatusCode::UNAUTHORIZED,
            body: "bad key".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("bad key"));
        assert_eq!(err.phase(), Some(Phase::Authorize));
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn protocol_violation_names_phase() {
        let err = UploadError::protocol(Phase::StatusQuery, "missing Range header");
        assert_eq!(
            err.to_string(),
            "protocol violation during status query: missing Range header"
        );
        assert_eq!(err.status(), None);
    }

    #[test]
    fn local_errors_have_no_phase() {
        let err = UploadError::SizeMismatch {
            declared: 10,
            actual: 9,
        };
        assert_eq!(err.phase(), None);
    }
}
