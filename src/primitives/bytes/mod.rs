#![forbid(unsafe_code)]
//! Field encoders and varints used by the index key codec.

pub mod ord {
    //! Order-preserving encoders for numeric key fields.
    //!
    //! Every encoder produces a fixed-width big-endian image whose unsigned byte order
    //! matches the numeric order of the input, so key fields compare with `memcmp`.

    const SIGN_BIT: u64 = 1 << 63;

    /// Big-endian image of an unsigned integer.
    pub fn u64_field(v: u64) -> [u8; 8] {
        v.to_be_bytes()
    }

    /// Signed integer with the sign bit flipped so negatives sort first.
    pub fn i64_field(v: i64) -> [u8; 8] {
        ((v as u64) ^ SIGN_BIT).to_be_bytes()
    }

    /// Float image in total order; `-0.0` sorts before `0.0`. NaN is rejected.
    pub fn f64_field(v: f64) -> Option<[u8; 8]> {
        if v.is_nan() {
            return None;
        }
        let bits = v.to_bits();
        let encoded = if bits & SIGN_BIT != 0 {
            !bits
        } else {
            bits ^ SIGN_BIT
        };
        Some(encoded.to_be_bytes())
    }

    /// Inverse of [`u64_field`]; `None` unless `src` is exactly eight bytes.
    pub fn decode_u64_field(src: &[u8]) -> Option<u64> {
        let bytes: [u8; 8] = src.try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }

    /// Inverse of [`i64_field`].
    pub fn decode_i64_field(src: &[u8]) -> Option<i64> {
        decode_u64_field(src).map(|raw| (raw ^ SIGN_BIT) as i64)
    }
}

pub mod var {
    //! Unsigned LEB128 varints.

    /// Encodes a u64 as an unsigned varint.
    pub fn encode_u64(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                break;
            }
            out.push(byte | 0x80);
        }
    }

    /// Number of bytes [`encode_u64`] emits for `v`.
    pub fn encoded_len(mut v: u64) -> usize {
        let mut len = 1;
        while v >= 0x80 {
            v >>= 7;
            len += 1;
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::{ord, var};
    use crate::storage::btree::KeyCursor;
    use crate::types::IndexError;
    use proptest::prelude::*;

    #[test]
    fn f64_ordering_handles_neg_zero() {
        let neg = ord::f64_field(-0.0).expect("finite");
        let pos = ord::f64_field(0.0).expect("finite");
        assert!(neg < pos, "negative zero must sort before positive zero");
        assert!(ord::f64_field(f64::NAN).is_none());
    }

    #[test]
    fn varint_lengths_match_encoding() {
        for v in [0u64, 0x7f, 0x80, 0x3fff, 0x4000, u64::MAX] {
            let mut buf = Vec::new();
            var::encode_u64(v, &mut buf);
            assert_eq!(buf.len(), var::encoded_len(v), "value {v:#x}");
        }
    }

    proptest! {
        #[test]
        fn order_preserving_i64_prop(xs in proptest::collection::vec(any::<i64>(), 1..64)) {
            let mut encoded: Vec<[u8; 8]> = xs.iter().map(|&v| ord::i64_field(v)).collect();
            encoded.sort();
            let decoded: Vec<i64> = encoded
                .iter()
                .map(|buf| ord::decode_i64_field(buf).expect("8 bytes"))
                .collect();
            let mut expected = xs.clone();
            expected.sort();
            prop_assert_eq!(decoded, expected);
        }

        #[test]
        fn order_preserving_f64_prop(a in any::<f64>(), b in any::<f64>()) {
            prop_assume!(a.is_finite() && b.is_finite());
            let ea = ord::f64_field(a).expect("finite");
            let eb = ord::f64_field(b).expect("finite");
            if a < b {
                prop_assert!(ea < eb);
            } else if a > b {
                prop_assert!(ea > eb);
            }
        }

        #[test]
        fn varint_roundtrip_through_key_cursor(v in any::<u64>()) {
            let mut buf = Vec::new();
            var::encode_u64(v, &mut buf);
            let mut cursor = KeyCursor::new(&buf);
            prop_assert_eq!(cursor.read_var_u64(IndexError::Corruption("truncated")).expect("decodes"), v);
            prop_assert!(cursor.is_empty());
        }
    }
}
