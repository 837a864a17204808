//! Header codec for the resumable-upload byte ranges.
//!
//! - outgoing `Content-Range: bytes {first}-{last}/{size}` on a resumed send
//! - outgoing `Content-Range: bytes */{size}` on a status query
//! - incoming `Range: bytes=0-{last}` on a 308 status query answer

use crate::errors::{Phase, UploadError, UploadResult};

/// `Content-Range` for a send starting at `offset`.
///
/// The first send of an upload carries no range at all. Once every byte has
/// been acknowledged there is no span left to name, so the finalising send
/// uses the unsatisfied form, same as a status query.
pub fn send_content_range(offset: u64, size: u64) -> Option<String> {
    if offset == 0 {
        None
    } else if offset >= size {
        Some(status_query_content_range(size))
    } else {
        Some(format!("bytes {}-{}/{}", offset, size - 1, size))
    }
}

/// `Content-Range` for a zero-length status query.
pub fn status_query_content_range(size: u64) -> String {
    format!("bytes */{}", size)
}

/// Parse a `Range: bytes=0-N` answer and return the next offset to send (`N + 1`).
///
/// Anything else is a protocol violation: the loop must not guess an offset.
pub fn parse_range_header(value: &str) -> UploadResult<u64> {
    let malformed = || {
        UploadError::protocol(
            Phase::StatusQuery,
            format!("malformed Range header `{}`", value),
        )
    };

    let span = value.trim().strip_prefix("bytes=").ok_or_else(malformed)?;
    let (first, last) = span.split_once('-').ok_or_else(malformed)?;

    if first.trim() != "0" {
        return Err(malformed());
    }

    let last: u64 = last.trim().parse().map_err(|_| malformed())?;
    last.checked_add(1).ok_or_else(malformed)
}
