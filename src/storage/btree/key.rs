use std::cmp::Ordering;
use std::fmt;

use smallvec::SmallVec;

use super::{KeyCursor, KeyOrdering};
use crate::primitives::bytes::{ord, var};
use crate::types::{IndexError, Result};

/// Owned composite index key.
///
/// A key is an ordered list of byte-string fields. Fields compare with unsigned byte
/// order, adjusted per field by a [`KeyOrdering`]; a key that is a strict prefix of
/// another sorts first. The stored image is `varint field_count` followed by
/// `varint len | bytes` per field.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    bytes: Vec<u8>,
}

impl IndexKey {
    /// Encodes a key from raw field images.
    pub fn from_fields<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        let fields: SmallVec<[F; 4]> = fields.into_iter().collect();
        let mut bytes = Vec::new();
        var::encode_u64(fields.len() as u64, &mut bytes);
        for field in &fields {
            let field = field.as_ref();
            var::encode_u64(field.len() as u64, &mut bytes);
            bytes.extend_from_slice(field);
        }
        Self { bytes }
    }

    /// Starts a multi-field key.
    pub fn builder() -> KeyBuilder {
        KeyBuilder::default()
    }

    /// Single unsigned integer field.
    pub fn from_u64(value: u64) -> Self {
        Self::from_fields([ord::u64_field(value)])
    }

    /// Single signed integer field.
    pub fn from_i64(value: i64) -> Self {
        Self::from_fields([ord::i64_field(value)])
    }

    /// Single UTF-8 text field, ordered by bytes.
    pub fn from_text(value: &str) -> Self {
        Self::from_fields([value.as_bytes()])
    }

    /// Validates and copies an encoded key image.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let key = KeyRef::parse(bytes)?;
        if key.encoded_len() != bytes.len() {
            return Err(IndexError::Corruption("trailing bytes after key"));
        }
        Ok(key.to_key())
    }

    /// Borrowed view of this key.
    pub fn as_key(&self) -> KeyRef<'_> {
        KeyRef { bytes: &self.bytes }
    }

    /// Encoded image.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the encoded image, the size charged against bucket space.
    pub fn encoded_len(&self) -> usize {
        self.bytes.len()
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        self.as_key().field_count()
    }

    /// Iterates the raw field images.
    pub fn fields(&self) -> Fields<'_> {
        self.as_key().fields()
    }

    /// Compares two keys under `ordering`.
    pub fn compare(&self, other: &IndexKey, ordering: KeyOrdering) -> Ordering {
        self.as_key().compare(other.as_key(), ordering)
    }
}

impl fmt::Debug for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexKey({})", self.as_key())
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_key(), f)
    }
}

/// Builder for multi-field keys.
#[derive(Default, Debug)]
pub struct KeyBuilder {
    fields: SmallVec<[Vec<u8>; 4]>,
}

impl KeyBuilder {
    /// Appends an unsigned integer field.
    pub fn u64(mut self, value: u64) -> Self {
        self.fields.push(ord::u64_field(value).to_vec());
        self
    }

    /// Appends a signed integer field.
    pub fn i64(mut self, value: i64) -> Self {
        self.fields.push(ord::i64_field(value).to_vec());
        self
    }

    /// Appends a float field; NaN has no position in the order and is rejected.
    pub fn f64(mut self, value: f64) -> Result<Self> {
        let field = ord::f64_field(value).ok_or(IndexError::Invalid("NaN key field"))?;
        self.fields.push(field.to_vec());
        Ok(self)
    }

    /// Appends a UTF-8 text field.
    pub fn text(mut self, value: &str) -> Self {
        self.fields.push(value.as_bytes().to_vec());
        self
    }

    /// Appends a raw byte field.
    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.fields.push(value.to_vec());
        self
    }

    /// Encodes the key.
    pub fn finish(self) -> IndexKey {
        IndexKey::from_fields(self.fields)
    }
}

/// Borrowed, validated key image, typically pointing into a bucket page.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KeyRef<'a> {
    bytes: &'a [u8],
}

impl<'a> KeyRef<'a> {
    /// Parses the key image at the start of `buf`, ignoring anything after it.
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        let mut cursor = KeyCursor::new(buf);
        let count = cursor.read_count()?;
        for _ in 0..count {
            cursor.next_field()?;
        }
        Ok(Self {
            bytes: &buf[..cursor.position()],
        })
    }

    /// Encoded image.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Length of the encoded image.
    pub fn encoded_len(&self) -> usize {
        self.bytes.len()
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        KeyCursor::new(self.bytes)
            .read_count()
            .map(|count| count as usize)
            .unwrap_or(0)
    }

    /// Iterates the raw field images.
    pub fn fields(&self) -> Fields<'a> {
        let mut cursor = KeyCursor::new(self.bytes);
        let remaining = cursor.read_count().unwrap_or(0);
        Fields { cursor, remaining }
    }

    /// Compares field by field under `ordering`.
    pub fn compare(&self, other: KeyRef<'_>, ordering: KeyOrdering) -> Ordering {
        let mut left = self.fields();
        let mut right = other.fields();
        let mut field = 0;
        loop {
            match (left.next(), right.next()) {
                (Some(l), Some(r)) => {
                    let cmp = ordering.apply(field, l.cmp(r));
                    if cmp != Ordering::Equal {
                        return cmp;
                    }
                    field += 1;
                }
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
            }
        }
    }

    /// Copies the image into an owned key.
    pub fn to_key(&self) -> IndexKey {
        IndexKey {
            bytes: self.bytes.to_vec(),
        }
    }
}

impl fmt::Debug for KeyRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyRef({self})")
    }
}

impl fmt::Display for KeyRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ ")?;
        for (idx, field) in self.fields().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            match std::str::from_utf8(field) {
                Ok(text) if !text.is_empty() && !text.chars().any(char::is_control) => {
                    write!(f, "{text:?}")?
                }
                _ => write!(f, "0x{}", hex::encode(field))?,
            }
        }
        f.write_str(" }")
    }
}

/// Iterator over the fields of a key image.
pub struct Fields<'a> {
    cursor: KeyCursor<'a>,
    remaining: u64,
}

impl<'a> Iterator for Fields<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.cursor.next_field().ok()
    }
}
