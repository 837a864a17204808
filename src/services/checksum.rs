//! Optional `Content-MD5` for data-carrying sends.

use base64::{Engine, engine::general_purpose::STANDARD};
use md5::Context;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_BUF_SIZE: usize = 64 * 1024;

/// Base64-encoded MD5 of everything `reader` yields, as expected in a
/// `Content-MD5` header.
///
/// The digest must cover exactly the request body, so callers hand in a reader
/// limited to the byte span being sent.
pub async fn content_md5<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut digest = Context::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        digest.consume(&buf[..n]);
    }

    Ok(STANDARD.encode(digest.compute().0))
}
