//! Primitive body notations: `[short]`, `[int]`, `[string]`, `[bytes]` and
//! the maps and lists built from them.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::CodecError;
use crate::kind::MessageKind;

/// Cursor over a message body that reports failures against its kind.
#[derive(Debug)]
pub struct BodyReader<'a> {
    kind: MessageKind,
    buf: &'a [u8],
}

impl<'a> BodyReader<'a> {
    /// Starts reading `buf` as the body of `kind`.
    #[must_use]
    pub const fn new(kind: MessageKind, buf: &'a [u8]) -> Self {
        Self { kind, buf }
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Reads a `[short]`.
    ///
    /// # Errors
    ///
    /// Fails when fewer than two bytes remain.
    pub fn short(&mut self) -> Result<u16, CodecError> {
        self.need(2, "short")?;
        Ok(self.buf.get_u16())
    }

    /// Reads an `[int]`.
    ///
    /// # Errors
    ///
    /// Fails when fewer than four bytes remain.
    pub fn int(&mut self) -> Result<i32, CodecError> {
        self.need(4, "int")?;
        Ok(self.buf.get_i32())
    }

    /// Reads a `[string]`.
    ///
    /// # Errors
    ///
    /// Fails on truncation or invalid UTF-8.
    pub fn string(&mut self) -> Result<String, CodecError> {
        let len = usize::from(self.short()?);
        self.utf8(len)
    }

    /// Reads a `[long string]`.
    ///
    /// # Errors
    ///
    /// Fails on a negative length, truncation or invalid UTF-8.
    pub fn long_string(&mut self) -> Result<String, CodecError> {
        let raw = self.int()?;
        let len = usize::try_from(raw)
            .map_err(|_| CodecError::malformed(self.kind, "negative long string length"))?;
        self.utf8(len)
    }

    /// Reads `[bytes]`; a negative length is the null value.
    ///
    /// # Errors
    ///
    /// Fails on truncation.
    pub fn bytes(&mut self) -> Result<Option<Vec<u8>>, CodecError> {
        let Ok(len) = usize::try_from(self.int()?) else {
            return Ok(None);
        };
        self.need(len, "bytes")?;
        let mut value = vec![0_u8; len];
        self.buf.copy_to_slice(&mut value);
        Ok(Some(value))
    }

    /// Reads a `[string map]`.
    ///
    /// # Errors
    ///
    /// Fails when any entry is malformed.
    pub fn string_map(&mut self) -> Result<BTreeMap<String, String>, CodecError> {
        let count = self.short()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.string()?;
            let value = self.string()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Reads a `[string list]`.
    ///
    /// # Errors
    ///
    /// Fails when any entry is malformed.
    pub fn string_list(&mut self) -> Result<Vec<String>, CodecError> {
        let count = self.short()?;
        (0..count).map(|_| self.string()).collect()
    }

    /// Reads a `[string multimap]`.
    ///
    /// # Errors
    ///
    /// Fails when any entry is malformed.
    pub fn string_multimap(&mut self) -> Result<BTreeMap<String, Vec<String>>, CodecError> {
        let count = self.short()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.string()?;
            let values = self.string_list()?;
            map.insert(key, values);
        }
        Ok(map)
    }

    /// Takes the unread tail.
    #[must_use]
    pub fn rest(self) -> &'a [u8] {
        self.buf
    }

    fn utf8(&mut self, len: usize) -> Result<String, CodecError> {
        self.need(len, "string")?;
        let buf: &'a [u8] = self.buf;
        let (head, tail) = buf.split_at(len);
        self.buf = tail;
        String::from_utf8(head.to_vec())
            .map_err(|error| CodecError::malformed(self.kind, format!("invalid UTF-8: {error}")))
    }

    fn need(&self, len: usize, what: &str) -> Result<(), CodecError> {
        if self.buf.remaining() < len {
            return Err(CodecError::malformed(
                self.kind,
                format!(
                    "truncated {what}: needed {len} bytes, {} remain",
                    self.buf.remaining()
                ),
            ));
        }
        Ok(())
    }
}

/// Builder for a message body.
#[derive(Debug, Default)]
pub struct BodyWriter {
    buf: BytesMut,
}

impl BodyWriter {
    /// Starts an empty body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes an `[int]`.
    pub fn int(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32(value);
        self
    }

    /// Writes a `[string]`, truncating at 65535 bytes.
    pub fn string(&mut self, value: &str) -> &mut Self {
        let bytes = value.as_bytes();
        let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
        self.buf.put_u16(len);
        self.buf.put_slice(bytes.get(..usize::from(len)).unwrap_or_default());
        self
    }

    /// Writes a `[long string]`.
    pub fn long_string(&mut self, value: &str) -> &mut Self {
        self.bytes(Some(value.as_bytes()))
    }

    /// Writes `[bytes]`, using a negative length for `None`.
    pub fn bytes(&mut self, value: Option<&[u8]>) -> &mut Self {
        match value {
            Some(bytes) => {
                let len = i32::try_from(bytes.len()).unwrap_or(i32::MAX);
                self.buf.put_i32(len);
                self.buf.put_slice(bytes);
            }
            None => self.buf.put_i32(-1),
        }
        self
    }

    /// Writes a `[string map]`.
    pub fn string_map<'a>(
        &mut self,
        entries: impl ExactSizeIterator<Item = (&'a str, &'a str)>,
    ) -> &mut Self {
        self.buf
            .put_u16(u16::try_from(entries.len()).unwrap_or(u16::MAX));
        for (key, value) in entries.take(usize::from(u16::MAX)) {
            self.string(key).string(value);
        }
        self
    }

    /// Writes a `[string list]`.
    pub fn string_list<'a>(&mut self, values: impl ExactSizeIterator<Item = &'a str>) -> &mut Self {
        self.buf
            .put_u16(u16::try_from(values.len()).unwrap_or(u16::MAX));
        for value in values.take(usize::from(u16::MAX)) {
            self.string(value);
        }
        self
    }

    /// Writes a `[string multimap]`.
    pub fn string_multimap(&mut self, entries: &BTreeMap<String, Vec<String>>) -> &mut Self {
        self.buf
            .put_u16(u16::try_from(entries.len()).unwrap_or(u16::MAX));
        for (key, values) in entries.iter().take(usize::from(u16::MAX)) {
            self.string(key)
                .string_list(values.iter().map(String::as_str));
        }
        self
    }

    /// Appends raw bytes.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Finished body.
    #[must_use]
    pub fn finish(self) -> BytesMut {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn string_map_survives_a_write_and_read() {
        let mut writer = BodyWriter::new();
        writer.string_map([("CQL_VERSION", "3.4.5"), ("COMPRESSION", "none")].into_iter());
        let body = writer.finish();

        let mut reader = BodyReader::new(MessageKind::Startup, &body);
        let map = reader.string_map().expect("decode map");
        assert_eq!(map.get("CQL_VERSION").map(String::as_str), Some("3.4.5"));
        assert_eq!(map.len(), 2);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn null_bytes_read_back_as_none() {
        let mut writer = BodyWriter::new();
        writer.bytes(None).bytes(Some(b"token"));
        let body = writer.finish();

        let mut reader = BodyReader::new(MessageKind::AuthResponse, &body);
        assert_eq!(reader.bytes().expect("null"), None);
        assert_eq!(reader.bytes().expect("token"), Some(b"token".to_vec()));
    }

    #[rstest]
    #[case::short_string(&[0x00, 0x05, b'a'])]
    #[case::missing_length(&[0x00])]
    fn truncated_strings_name_the_kind(#[case] body: &[u8]) {
        let mut reader = BodyReader::new(MessageKind::Query, body);
        let error = reader.string().expect_err("must fail");
        assert!(error.to_string().starts_with("malformed QUERY body: truncated"));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut reader = BodyReader::new(MessageKind::Query, &[0x00, 0x01, 0xFF]);
        assert!(reader.string().is_err());
    }

    #[test]
    fn negative_long_string_length_is_rejected() {
        let body = (-3_i32).to_be_bytes();
        let mut reader = BodyReader::new(MessageKind::Query, &body);
        assert!(reader.long_string().is_err());
    }
}
