//! Represents the server-tracked resumable session for one upload.

use crate::errors::{Phase, UploadError, UploadResult};

/// Where the upload loop stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Complete,
    Failed,
}

/// Mutable state of an upload between initiation and the end of the loop.
///
/// The session URI is fixed at construction. The acknowledged offset only
/// moves forward and never passes the declared size.
#[derive(Clone, Debug)]
pub struct UploadSession {
    uri: String,
    size: u64,
    offset: u64,
    status: SessionStatus,
    resumes: u32,
}

impl UploadSession {
    pub fn new(uri: impl Into<String>, size: u64) -> Self {
        Self {
            uri: uri.into(),
            size,
            offset: 0,
            status: SessionStatus::Pending,
            resumes: 0,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes the remote has acknowledged.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes still to send from the current offset.
    pub fn remaining(&self) -> u64 {
        self.size - self.offset
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn resumes(&self) -> u32 {
        self.resumes
    }

    /// Move to the offset a status query reported.
    pub fn resume_at(&mut self, offset: u64) -> UploadResult<()> {
        if offset < self.offset {
            return Err(UploadError::protocol(
                Phase::StatusQuery,
                format!(
                    "remote reported offset {} below previously acknowledged {}",
                    offset, self.offset
                ),
            ));
        }
        if offset > self.size {
            return Err(UploadError::protocol(
                Phase::StatusQuery,
                format!("remote reported offset {} past file size {}", offset, self.size),
            ));
        }

        self.offset = offset;
        self.resumes += 1;
        Ok(())
    }

    pub fn complete(&mut self) -> UploadOutcome {
        self.offset = self.size;
        self.status = SessionStatus::Complete;
        UploadOutcome {
            session_uri: self.uri.clone(),
            bytes: self.size,
            resumes: self.resumes,
        }
    }

    pub fn fail(&mut self) {
        self.status = SessionStatus::Failed;
    }
}

/// Summary of a finished upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadOutcome {
    pub session_uri: String,
    pub bytes: u64,
    /// How many times the loop resumed after a transient failure.
    pub resumes: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_pending_at_zero() {
        let session = UploadSession::new("https://upload/session", 10);
        assert_eq!(session.offset(), 0);
        assert_eq!(session.remaining(), 10);
        assert_eq!(session.status(), SessionStatus::Pending);
    }

    #[test]
    fn resume_moves_forward() {
        let mut session = UploadSession::new("s", 10);
        session.resume_at(5).unwrap();
        session.resume_at(5).unwrap();
        session.resume_at(9).unwrap();
        assert_eq!(session.offset(), 9);
        assert_eq!(session.remaining(), 1);
        assert_eq!(session.resumes(), 3);
    }

    #[test]
    fn resume_to_full_size_leaves_nothing_to_send() {
        let mut session = UploadSession::new("s", 10);
        session.resume_at(10).unwrap();
        assert_eq!(session.remaining(), 0);
    }

    #[test]
    fn offset_never_goes_backwards() {
        let mut session = UploadSession::new("s", 10);
        session.resume_at(6).unwrap();
        let err = session.resume_at(3).unwrap_err();
        assert!(matches!(err, UploadError::ProtocolViolation { .. }));
        assert_eq!(session.offset(), 6);
    }

    #[test]
    fn offset_never_passes_size() {
        let mut session = UploadSession::new("s", 10);
        assert!(session.resume_at(11).is_err());
        assert_eq!(session.offset(), 0);
    }

    #[test]
    fn complete_reports_outcome() {
        let mut session = UploadSession::new("s", 10);
        session.resume_at(5).unwrap();
        let outcome = session.complete();
        assert_eq!(session.status(), SessionStatus::Complete);
        assert_eq!(
            outcome,
            UploadOutcome {
                session_uri: "s".into(),
                bytes: 10,
                resumes: 1,
            }
        );
    }
}
