//! Tolerant request-head reader.
//!
//! The decoy accepts anything that vaguely resembles an HTTP request head.
//! Malformed lines are kept out of the parsed view but never cause a
//! rejection; attackers get the same response no matter what they send.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use lurepot_core::Header;

/// Hard cap on bytes read for one request head.
pub const MAX_HEAD_BYTES: u64 = 32 * 1024;
/// Headers kept per request; the rest of the head is drained and dropped.
pub const MAX_HEADERS: usize = 100;

/// The parsed view of one request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub request_line: String,
    pub headers: Vec<Header>,
}

/// Read one request head from the stream. Returns `Ok(None)` when the peer
/// closed the connection without sending a request line.
///
/// # Errors
///
/// Returns an error only on transport failure, never on malformed input.
pub async fn read_request_head<R>(reader: &mut R) -> std::io::Result<Option<RequestHead>>
where
    R: AsyncBufRead + Unpin,
{
    let Some(request_line) = read_line(reader).await? else {
        return Ok(None);
    };
    if request_line.is_empty() {
        return Ok(None);
    }

    let mut headers = Vec::new();
    while let Some(line) = read_line(reader).await? {
        if line.is_empty() {
            break;
        }
        // Past the cap, keep draining to the blank terminator so the
        // socket is left at a clean boundary.
        if headers.len() >= MAX_HEADERS {
            continue;
        }
        // Lines without a colon are noise, not a reason to bail.
        if let Some((name, value)) = line.split_once(':') {
            headers.push(Header {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            });
        }
    }

    Ok(Some(RequestHead {
        request_line,
        headers,
    }))
}

// Byte-level read with lossy conversion: scanners send arbitrary byte
// sequences and still deserve a response and a log entry, so non-UTF-8
// input is replaced, never a reason to drop the connection.
async fn read_line<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    let mut line = String::from_utf8_lossy(&buf).into_owned();
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}
