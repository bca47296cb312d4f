//! Fixed-size value codecs for leaf payloads.
//!
//! The trie stores one fixed-width value per leaf in a flat byte pool; the
//! codec is the only party that interprets those bytes. Widths are static
//! per codec (the read side sizes every leaf slot from `encoded_size`
//! before any value exists), and all provided codecs are little-endian.

/// Encodes and decodes one leaf value at a fixed byte width.
pub trait ValueCodec {
    type Value;

    /// Encoded width in bytes. Constant for the lifetime of the codec.
    fn encoded_size(&self) -> usize;

    /// Append the encoded form of `v` to `out` (exactly `encoded_size`
    /// bytes).
    fn encode(&self, v: &Self::Value, out: &mut Vec<u8>);

    /// Decode one value from the start of `bytes` (`encoded_size` bytes).
    fn decode(&self, bytes: &[u8]) -> Self::Value;
}

macro_rules! le_codec {
    ($name:ident, $ty:ty, $width:expr) => {
        #[doc = concat!("Little-endian `", stringify!($ty), "` codec.")]
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl ValueCodec for $name {
            type Value = $ty;

            #[inline]
            fn encoded_size(&self) -> usize {
                $width
            }

            #[inline]
            fn encode(&self, v: &$ty, out: &mut Vec<u8>) {
                out.extend_from_slice(&v.to_le_bytes());
            }

            #[inline]
            fn decode(&self, bytes: &[u8]) -> $ty {
                let mut buf = [0u8; $width];
                buf.copy_from_slice(&bytes[..$width]);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

le_codec!(U16Codec, u16, 2);
le_codec!(U32Codec, u32, 4);
le_codec!(U64Codec, u64, 8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32_codec_roundtrip() {
        let c = U32Codec;
        let mut buf = Vec::new();
        c.encode(&0xDEAD_BEEF, &mut buf);
        assert_eq!(buf.len(), c.encoded_size());
        assert_eq!(c.decode(&buf), 0xDEAD_BEEF);
    }

    #[test]
    fn test_codec_widths() {
        assert_eq!(U16Codec.encoded_size(), 2);
        assert_eq!(U32Codec.encoded_size(), 4);
        assert_eq!(U64Codec.encoded_size(), 8);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let c = U16Codec;
        assert_eq!(c.decode(&[0x34, 0x12, 0xFF, 0xFF]), 0x1234);
    }
}
