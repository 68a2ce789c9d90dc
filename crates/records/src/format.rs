//! Record framing for the flat record tables.
//!
//! ```text
//! [crc32: u32 LE][name_len: u16 LE][name bytes][value: V::WIDTH bytes]
//! ```
//!
//! The CRC32 covers everything after itself (name_len through end of value).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use merkle::{Digest, DIGEST_LEN};
use std::marker::PhantomData;

use crate::StoreError;

/// Longest accepted record name in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Bytes preceding the name: crc32 + name_len.
const HEADER_BYTES: usize = 4 + 2;

/// A fixed-width value stored next to a name in a [`RecordTable`](crate::RecordTable).
pub trait RecordValue: Sized + Clone {
    /// Encoded width in bytes.
    const WIDTH: usize;

    fn encode(&self, buf: &mut Vec<u8>);

    /// Decodes exactly [`Self::WIDTH`] bytes. `None` means the bytes are not a
    /// valid value.
    fn decode(bytes: &[u8]) -> Option<Self>;
}

impl RecordValue for Digest {
    const WIDTH: usize = DIGEST_LEN;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        Digest::from_slice(bytes)
    }
}

impl RecordValue for u64 {
    const WIDTH: usize = 8;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(mut bytes: &[u8]) -> Option<Self> {
        bytes.read_u64::<LittleEndian>().ok()
    }
}

/// Checks that `name` can be framed.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
            reason: "name must not be empty",
        });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
            reason: "name longer than 255 bytes",
        });
    }
    Ok(())
}

/// Appends one framed record to `buf`. The name must already be validated.
pub fn encode_record<V: RecordValue>(buf: &mut Vec<u8>, name: &str, value: &V) {
    let start = buf.len();
    buf.extend_from_slice(&[0u8; 4]);

    let body_start = buf.len();
    // Writing into a Vec cannot fail.
    let _ = buf.write_u16::<LittleEndian>(name.len() as u16);
    buf.extend_from_slice(name.as_bytes());
    value.encode(buf);

    let mut hasher = Crc32::new();
    hasher.update(&buf[body_start..]);
    let crc = hasher.finalize();
    buf[start..body_start].copy_from_slice(&crc.to_le_bytes());
}

/// Sequential decoder over an in-memory table image.
///
/// Yields records in file order. The first malformed record produces an
/// error and ends the iteration.
pub struct Records<'a, V> {
    buf: &'a [u8],
    pos: usize,
    _value: PhantomData<V>,
}

impl<'a, V: RecordValue> Records<'a, V> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            _value: PhantomData,
        }
    }

    fn corrupt(&mut self, reason: &'static str) -> StoreError {
        let offset = self.pos as u64;
        self.pos = self.buf.len();
        StoreError::Corrupt { offset, reason }
    }

    fn next_record(&mut self) -> Result<(String, V), StoreError> {
        let rest = &self.buf[self.pos..];
        if rest.len() < HEADER_BYTES {
            return Err(self.corrupt("truncated record header"));
        }

        let mut hdr = &rest[..HEADER_BYTES];
        let crc = hdr.read_u32::<LittleEndian>()?;
        let name_len = hdr.read_u16::<LittleEndian>()? as usize;
        if name_len == 0 || name_len > MAX_NAME_LEN {
            return Err(self.corrupt("name length out of range"));
        }

        let total = HEADER_BYTES + name_len + V::WIDTH;
        if rest.len() < total {
            return Err(self.corrupt("truncated record body"));
        }

        let body = &rest[4..total];
        let mut hasher = Crc32::new();
        hasher.update(body);
        if hasher.finalize() != crc {
            return Err(self.corrupt("checksum mismatch"));
        }

        let name_bytes = &rest[HEADER_BYTES..HEADER_BYTES + name_len];
        let name = match std::str::from_utf8(name_bytes) {
            Ok(s) => s.to_string(),
            Err(_) => return Err(self.corrupt("name is not utf-8")),
        };
        let value = match V::decode(&rest[HEADER_BYTES + name_len..total]) {
            Some(v) => v,
            None => return Err(self.corrupt("undecodable value")),
        };

        self.pos += total;
        Ok((name, value))
    }
}

impl<V: RecordValue> Iterator for Records<'_, V> {
    type Item = Result<(String, V), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        Some(self.next_record())
    }
}
