//! Represents the file and record metadata a caller wants uploaded.

use chrono::NaiveDate;
use serde::Serialize;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

/// Record metadata sent to the partner endpoint when asking for a signed URL.
///
/// Optional fields are left out of the JSON body entirely when unset.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadMetadata {
    /// Partner-side patient identifier.
    #[serde(rename = "patientID")]
    pub patient_id: String,

    /// Free-text description of the file.
    pub description: String,

    /// Kind of record (e.g. "MRI").
    #[serde(rename = "type")]
    pub record_type: String,

    /// NPI of the referring provider. Zero counts as unset.
    #[serde(rename = "referringNPI", skip_serializing_if = "npi_is_unset")]
    pub referring_npi: Option<u64>,

    /// NPI of the rendering provider. Zero counts as unset.
    #[serde(rename = "renderingNPI", skip_serializing_if = "npi_is_unset")]
    pub rendering_npi: Option<u64>,

    #[serde(rename = "accessionNumber", skip_serializing_if = "text_is_unset")]
    pub accession_number: Option<String>,

    /// Serialized as `YYYY-MM-DD`.
    #[serde(rename = "encounterDate", skip_serializing_if = "Option::is_none")]
    pub encounter_date: Option<NaiveDate>,
}

fn npi_is_unset(npi: &Option<u64>) -> bool {
    matches!(npi, None | Some(0))
}

fn text_is_unset(text: &Option<String>) -> bool {
    text.as_deref().is_none_or(|t| t.trim().is_empty())
}

/// An upload request: which file, how big, and what it is.
///
/// The size is read once from the filesystem when the request is built and is
/// never refreshed afterwards.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    path: PathBuf,
    size: u64,
    mime_type: String,
    metadata: UploadMetadata,
}

impl UploadRequest {
    /// Build a request for `path`, reading its size from file metadata.
    ///
    /// Fails if the path is missing or is not a regular file.
    pub async fn from_path(
        path: impl Into<PathBuf>,
        mime_type: impl Into<String>,
        metadata: UploadMetadata,
    ) -> io::Result<Self> {
        let path = path.into();
        let stat = tokio::fs::metadata(&path).await?;
        if !stat.is_file() {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        Ok(Self {
            path,
            size: stat.len(),
            mime_type: mime_type.into(),
            metadata,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

/// JSON body of the authorize call: the record metadata plus the MIME type.
#[derive(Serialize, Debug)]
pub struct AuthorizeBody<'a> {
    #[serde(flatten)]
    metadata: &'a UploadMetadata,

    #[serde(rename = "Content-Type")]
    content_type: &'a str,
}

impl<'a> From<&'a UploadRequest> for AuthorizeBody<'a> {
    fn from(request: &'a UploadRequest) -> Self {
        Self {
            metadata: &request.metadata,
            content_type: &request.mime_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn metadata() -> UploadMetadata {
        UploadMetadata {
            patient_id: "p-42".into(),
            description: "knee scan".into(),
            record_type: "MRI".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn authorize_body_carries_required_fields_only() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        let request = UploadRequest::from_path(file.path(), "image/png", metadata())
            .await
            .unwrap();

        let body = serde_json::to_value(AuthorizeBody::from(&request)).unwrap();
        assert_eq!(
            body,
            json!({
                "patientID": "p-42",
                "description": "knee scan",
                "type": "MRI",
                "Content-Type": "image/png",
            })
        );
        assert_eq!(request.size(), 3);
    }

    #[test]
    fn optional_fields_serialize_when_present() {
        let meta = UploadMetadata {
            referring_npi: Some(1234567890),
            rendering_npi: Some(0),
            accession_number: Some("ACC-1".into()),
            encounter_date: NaiveDate::from_ymd_opt(2024, 3, 9),
            ..metadata()
        };

        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["referringNPI"], json!(1234567890u64));
        assert!(value.get("renderingNPI").is_none());
        assert_eq!(value["accessionNumber"], json!("ACC-1"));
        assert_eq!(value["encounterDate"], json!("2024-03-09"));
    }

    #[test]
    fn blank_accession_number_is_omitted() {
        let meta = UploadMetadata {
            accession_number: Some("  ".into()),
            ..metadata()
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert!(value.get("accessionNumber").is_none());
    }

    #[tokio::test]
    async fn directories_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = UploadRequest::from_path(dir.path(), "text/plain", metadata())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = UploadRequest::from_path(dir.path().join("nope.bin"), "text/plain", metadata())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
