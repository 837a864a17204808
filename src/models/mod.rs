//! Core data models for a single resumable upload.
//!
//! `UploadRequest` is the immutable input built from caller flags,
//! `UploadSession` is the mutable state that lives between session
//! initiation and the end of the upload loop, and `range` holds the
//! `Content-Range` / `Range` header codec both sides of the loop share.

pub mod range;
pub mod request;
pub mod session;
pub mod signed_url;
