//! Minimal BER encoding for the directory-protocol client.
//!
//! Only definite lengths, only single-byte tags: exactly what the referral
//! query needs, decoded defensively because the peer is hostile.

use bytes::{BufMut, BytesMut};
use lurepot_core::FetchError;

pub const BOOLEAN: u8 = 0x01;
pub const INTEGER: u8 = 0x02;
pub const OCTET_STRING: u8 = 0x04;
pub const ENUMERATED: u8 = 0x0a;
pub const SEQUENCE: u8 = 0x30;
pub const SET: u8 = 0x31;

/// Longest single element accepted from the wire.
pub const MAX_ELEMENT_LEN: usize = 1 << 20;

/// Encode one tag-length-value element.
#[must_use]
pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(content.len() + 6);
    out.put_u8(tag);
    put_len(&mut out, content.len());
    out.put_slice(content);
    out.to_vec()
}

fn put_len(out: &mut BytesMut, len: usize) {
    if len < 0x80 {
        out.put_u8(len as u8);
    } else {
        let bytes = (len as u32).to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        out.put_u8(0x80 | (4 - skip) as u8);
        out.put_slice(&bytes[skip..]);
    }
}

/// Minimal two's-complement INTEGER encoding.
#[must_use]
pub fn integer(v: i64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let mut start = 0;
    while start < 7
        && ((bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0))
    {
        start += 1;
    }
    tlv(INTEGER, &bytes[start..])
}

#[must_use]
pub fn octet_string(content: &[u8]) -> Vec<u8> {
    tlv(OCTET_STRING, content)
}

#[must_use]
pub fn enumerated(v: u8) -> Vec<u8> {
    tlv(ENUMERATED, &[v])
}

#[must_use]
pub fn boolean(v: bool) -> Vec<u8> {
    tlv(BOOLEAN, &[if v { 0xff } else { 0x00 }])
}

/// Bounded reader over one received element body.
pub struct BerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BerReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Read the next element. Indefinite lengths, multi-byte tags and
    /// anything oversized or truncated are protocol errors.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Protocol` on malformed or out-of-bounds data.
    pub fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), FetchError> {
        let tag = self.next_byte()?;
        if tag & 0x1f == 0x1f {
            return Err(FetchError::Protocol("multi-byte tag".to_string()));
        }

        let first = self.next_byte()?;
        let len = if first & 0x80 == 0 {
            first as usize
        } else {
            let n = (first & 0x7f) as usize;
            if n == 0 {
                return Err(FetchError::Protocol("indefinite length".to_string()));
            }
            if n > 4 {
                return Err(FetchError::Protocol("length of length too large".to_string()));
            }
            let mut len = 0usize;
            for _ in 0..n {
                len = (len << 8) | self.next_byte()? as usize;
            }
            len
        };
        if len > MAX_ELEMENT_LEN {
            return Err(FetchError::Protocol(format!("element of {len} bytes too large")));
        }

        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(truncated)?;
        let content = &self.data[self.pos..end];
        self.pos = end;
        Ok((tag, content))
    }

    /// Read the next element and require a specific tag.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Protocol` if the tag differs or data is malformed.
    pub fn expect(&mut self, want: u8) -> Result<&'a [u8], FetchError> {
        let (tag, content) = self.read_tlv()?;
        if tag == want {
            Ok(content)
        } else {
            Err(FetchError::Protocol(format!(
                "expected tag {want:#04x}, got {tag:#04x}"
            )))
        }
    }

    /// # Errors
    ///
    /// Returns `FetchError::Protocol` on non-INTEGER or oversized content.
    pub fn read_integer(&mut self) -> Result<i64, FetchError> {
        decode_integer(self.expect(INTEGER)?)
    }

    /// # Errors
    ///
    /// Returns `FetchError::Protocol` on non-ENUMERATED or oversized content.
    pub fn read_enumerated(&mut self) -> Result<i64, FetchError> {
        decode_integer(self.expect(ENUMERATED)?)
    }

    /// # Errors
    ///
    /// Returns `FetchError::Protocol` on anything but an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<&'a [u8], FetchError> {
        self.expect(OCTET_STRING)
    }

    fn next_byte(&mut self) -> Result<u8, FetchError> {
        let b = *self.data.get(self.pos).ok_or_else(truncated)?;
        self.pos += 1;
        Ok(b)
    }
}

fn decode_integer(content: &[u8]) -> Result<i64, FetchError> {
    if content.is_empty() || content.len() > 8 {
        return Err(FetchError::Protocol("bad integer width".to_string()));
    }
    let mut v: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in content {
        v = (v << 8) | i64::from(b);
    }
    Ok(v)
}

fn truncated() -> FetchError {
    FetchError::Protocol("truncated element".to_string())
}
