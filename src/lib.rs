//! Client for a partner's resumable-upload endpoint.
//!
//! One upload is three phases: trade partner credentials for a signed URL,
//! open a resumable session with it, then send the file and resume from the
//! last acknowledged byte whenever the storage service reports a transient
//! failure.

pub mod config;
pub mod errors;
pub mod models;
pub mod services;

pub use config::AppConfig;
pub use errors::{Phase, UploadError, UploadResult};
pub use models::{
    request::{UploadMetadata, UploadRequest},
    session::UploadOutcome,
};
pub use services::{retry::RetryPolicy, upload_service::UploadClient};
