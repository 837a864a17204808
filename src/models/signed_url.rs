//! The partner's answer to an authorize call.

use crate::errors::{Phase, UploadError, UploadResult};
use serde::Deserialize;

/// Short-lived, single-use URL that authorizes opening one resumable session.
#[derive(Deserialize, Clone, Debug)]
pub struct SignedUrl {
    pub url: String,
}

impl SignedUrl {
    /// Decode the authorize response body.
    pub fn from_json(body: &str) -> UploadResult<Self> {
        let signed: SignedUrl = serde_json::from_str(body).map_err(|err| {
            UploadError::protocol(Phase::Authorize, format!("invalid signed URL response: {}", err))
        })?;

        if signed.url.trim().is_empty() {
            return Err(UploadError::protocol(Phase::Authorize, "signed URL is empty"));
        }

        Ok(signed)
    }
}
