//! Minimal, defensive directory-protocol client.
//!
//! Speaks just enough LDAP to read back one referral entry: anonymous
//! simple bind, a single base-object search with a present filter, then the
//! first `SearchResultEntry`. No credentials, no writes, and everything the
//! peer sends is treated as untrusted bytes under strict size and message
//! caps.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use lurepot_core::{FetchError, FetchOptions};

use crate::ber::{self, BerReader};

const APP_BIND_REQUEST: u8 = 0x60;
const APP_BIND_RESPONSE: u8 = 0x61;
const APP_SEARCH_REQUEST: u8 = 0x63;
const APP_SEARCH_ENTRY: u8 = 0x64;
const APP_SEARCH_DONE: u8 = 0x65;
const APP_SEARCH_REFERENCE: u8 = 0x73;
const CTX_SIMPLE_AUTH: u8 = 0x80;
const CTX_FILTER_PRESENT: u8 = 0x87;

/// Messages read per query before giving up; a hostile server cannot keep
/// the worker busy past this.
const MAX_MESSAGES: usize = 8;
/// Attributes kept per entry.
const MAX_ATTRIBUTES: usize = 64;

/// One directory entry as returned by the referral endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    /// Attribute name/value pairs in wire order, first value per attribute.
    pub attributes: Vec<(String, String)>,
}

impl DirectoryEntry {
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// LDIF-style rendering; these bytes are what gets hashed and stored.
    #[must_use]
    pub fn to_ldif(&self) -> String {
        let mut out = format!("dn: {}\n", self.name);
        for (key, value) in &self.attributes {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

/// Query the referral endpoint for the entry at `base`.
///
/// # Errors
///
/// Returns a `FetchError` on connect/read timeout, I/O failure, or any
/// protocol violation. The caller converts these into record data.
pub async fn query_referral(
    host: &str,
    port: u16,
    base: &str,
    opts: &FetchOptions,
) -> Result<DirectoryEntry, FetchError> {
    debug!(host, port, base, "querying directory referral");

    let mut stream = timeout(opts.connect_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| FetchError::ConnectTimeout(opts.connect_timeout))??;

    stream.write_all(&bind_request()).await?;

    let mut sent_search = false;
    for _ in 0..MAX_MESSAGES {
        let (op_tag, op_body) = read_operation(&mut stream, opts).await?;
        match op_tag {
            APP_BIND_RESPONSE => {
                check_result_code(&op_body)?;
                trace!("anonymous bind accepted");
                stream.write_all(&search_request(base)).await?;
                sent_search = true;
            }
            APP_SEARCH_ENTRY if sent_search => return parse_entry(&op_body),
            APP_SEARCH_REFERENCE if sent_search => {
                trace!("skipping search continuation reference");
            }
            APP_SEARCH_DONE => {
                return Err(FetchError::Protocol("search returned no entry".to_string()))
            }
            other => {
                return Err(FetchError::Protocol(format!(
                    "unexpected operation {other:#04x}"
                )))
            }
        }
    }

    Err(FetchError::Protocol(
        "too many messages without an entry".to_string(),
    ))
}

fn envelope(message_id: i64, op: &[u8]) -> Vec<u8> {
    let mut body = ber::integer(message_id);
    body.extend_from_slice(op);
    ber::tlv(ber::SEQUENCE, &body)
}

fn bind_request() -> Vec<u8> {
    let mut op = ber::integer(3); // protocol version
    op.extend(ber::octet_string(b"")); // anonymous
    op.extend(ber::tlv(CTX_SIMPLE_AUTH, b""));
    envelope(1, &ber::tlv(APP_BIND_REQUEST, &op))
}

fn search_request(base: &str) -> Vec<u8> {
    let mut op = ber::octet_string(base.as_bytes());
    op.extend(ber::enumerated(0)); // baseObject scope
    op.extend(ber::enumerated(0)); // neverDerefAliases
    op.extend(ber::integer(1)); // sizeLimit: one entry is all we want
    op.extend(ber::integer(10)); // timeLimit (seconds, server-side)
    op.extend(ber::boolean(false)); // typesOnly
    op.extend(ber::tlv(CTX_FILTER_PRESENT, b"objectClass"));
    op.extend(ber::tlv(ber::SEQUENCE, &[])); // all attributes
    envelope(2, &ber::tlv(APP_SEARCH_REQUEST, &op))
}

/// Read one protocol message envelope and return its operation.
async fn read_operation(
    stream: &mut TcpStream,
    opts: &FetchOptions,
) -> Result<(u8, Vec<u8>), FetchError> {
    let body = read_envelope(stream, opts).await?;
    let mut r = BerReader::new(&body);
    let _message_id = r.read_integer()?;
    let (tag, content) = r.read_tlv()?;
    Ok((tag, content.to_vec()))
}

async fn read_envelope(
    stream: &mut TcpStream,
    opts: &FetchOptions,
) -> Result<Vec<u8>, FetchError> {
    let mut header = [0u8; 2];
    read_exact_timed(stream, &mut header, opts).await?;
    if header[0] != ber::SEQUENCE {
        return Err(FetchError::Protocol("expected message envelope".to_string()));
    }

    let len = if header[1] & 0x80 == 0 {
        header[1] as usize
    } else {
        let n = (header[1] & 0x7f) as usize;
        if n == 0 || n > 4 {
            return Err(FetchError::Protocol("bad envelope length".to_string()));
        }
        let mut buf = [0u8; 4];
        read_exact_timed(stream, &mut buf[..n], opts).await?;
        buf[..n].iter().fold(0usize, |acc, &b| (acc << 8) | b as usize)
    };
    if len as u64 > opts.max_bytes || len > ber::MAX_ELEMENT_LEN {
        return Err(FetchError::TooLarge(opts.max_bytes));
    }

    let mut body = vec![0u8; len];
    read_exact_timed(stream, &mut body, opts).await?;
    Ok(body)
}

async fn read_exact_timed(
    stream: &mut TcpStream,
    buf: &mut [u8],
    opts: &FetchOptions,
) -> Result<(), FetchError> {
    timeout(opts.read_timeout, stream.read_exact(buf))
        .await
        .map_err(|_| FetchError::ReadTimeout(opts.read_timeout))??;
    Ok(())
}

fn check_result_code(body: &[u8]) -> Result<(), FetchError> {
    let mut r = BerReader::new(body);
    let code = r.read_enumerated()?;
    if code == 0 {
        Ok(())
    } else {
        Err(FetchError::Protocol(format!(
            "bind failed with result code {code}"
        )))
    }
}

fn parse_entry(body: &[u8]) -> Result<DirectoryEntry, FetchError> {
    let mut r = BerReader::new(body);
    let name = String::from_utf8_lossy(r.read_octet_string()?).into_owned();

    let mut attributes = Vec::new();
    let mut attrs = BerReader::new(r.expect(ber::SEQUENCE)?);
    while !attrs.is_empty() && attributes.len() < MAX_ATTRIBUTES {
        let mut attr = BerReader::new(attrs.expect(ber::SEQUENCE)?);
        let key = String::from_utf8_lossy(attr.read_octet_string()?).into_owned();
        let mut values = BerReader::new(attr.expect(ber::SET)?);
        let value = if values.is_empty() {
            String::new()
        } else {
            String::from_utf8_lossy(values.read_octet_string()?).into_owned()
        };
        attributes.push((key, value));
    }

    Ok(DirectoryEntry { name, attributes })
}
