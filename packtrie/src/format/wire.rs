//! Binary envelope for the packed trie (`PTI1`).
//!
//! ## Layout
//!
//! ```text
//! [Magic "PTI1"] [version:u8] [flags:u8] [short_size:u8]
//! [big_inner_cnt:u32LE] [big_inner_offset:u32LE] [short_minus_inner:i32LE]
//! (flags & NODES)
//!   [node_type_bm words] [inners words] [short_bm words]
//!   [short_table: count:u32LE + u16LE…]
//!   [inner_prefixes: elt_cnt:u32LE + presence words
//!     + (flags & INNER_FULL ? positions words : ∅)
//!     + pool: len:u32LE + bytes]
//! (flags & LEAF_PREFIXES)
//!   [presence words] [positions words] [pool: len:u32LE + bytes]
//! (flags & LEAVES)
//!   [fixed_size:u32LE] [n:u32LE] [elt_cnt:u32LE]
//!   [presence words] [pool: len:u32LE + bytes]
//! ```
//!
//! A word array is `count:u32LE` followed by `count` raw `u64LE` words.
//!
//! Rank and select checkpoints are never serialized; [`decode`] rebuilds
//! them, and that pass doubles as the structural validation the read side
//! relies on. The query engine assumes a valid structure and may answer
//! nonsense for a corrupt one, so everything checkable is rejected here.

use crate::bitmap::{BitmapR128, BitmapR64, PositionBitmap};
use crate::error::{Result, TrieError};
use crate::format::{InnerPrefixes, LeafPrefixes, Leaves, Packed, BIG_INNER_SIZE, INNER_SIZE};

/// Magic bytes identifying a packed-trie envelope.
pub const TRIE_MAGIC: [u8; 4] = *b"PTI1";

/// Current envelope version.
pub const TRIE_VERSION: u8 = 1;

// Section-presence flags
const FLAG_NODES: u8 = 1 << 0;
const FLAG_INNER_FULL: u8 = 1 << 1;
const FLAG_LEAF_PREFIXES: u8 = 1 << 2;
const FLAG_LEAVES: u8 = 1 << 3;

// ============================================================================
// Encoding
// ============================================================================

fn put_words(out: &mut Vec<u8>, words: &[u64]) {
    out.extend_from_slice(&(words.len() as u32).to_le_bytes());
    for w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
}

fn put_pool(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

/// Serialize a packed trie to a standalone byte envelope.
pub fn encode(packed: &Packed) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&TRIE_MAGIC);
    out.push(TRIE_VERSION);

    let mut flags = 0u8;
    if packed.node_type_bm.is_some() {
        flags |= FLAG_NODES;
    }
    if packed.inner_prefixes.position_bm.is_some() {
        flags |= FLAG_INNER_FULL;
    }
    if packed.leaf_prefixes.is_some() {
        flags |= FLAG_LEAF_PREFIXES;
    }
    if packed.leaves.is_some() {
        flags |= FLAG_LEAVES;
    }
    out.push(flags);
    out.push(packed.short_size as u8);
    out.extend_from_slice(&packed.big_inner_cnt.to_le_bytes());
    out.extend_from_slice(&packed.big_inner_offset.to_le_bytes());
    out.extend_from_slice(&packed.short_minus_inner.to_le_bytes());

    if let Some(ntbm) = &packed.node_type_bm {
        put_words(&mut out, &ntbm.words);
        put_words(&mut out, &packed.inners.words);
        put_words(&mut out, &packed.short_bm.words);

        out.extend_from_slice(&(packed.short_table.len() as u32).to_le_bytes());
        for v in &packed.short_table {
            out.extend_from_slice(&v.to_le_bytes());
        }

        let ips = &packed.inner_prefixes;
        out.extend_from_slice(&ips.elt_cnt.to_le_bytes());
        put_words(&mut out, &ips.presence_bm.words);
        if let Some(pos) = &ips.position_bm {
            put_words(&mut out, &pos.bm.words);
        }
        put_pool(&mut out, &ips.bytes);
    }

    if let Some(lps) = &packed.leaf_prefixes {
        put_words(&mut out, &lps.presence_bm.words);
        put_words(&mut out, &lps.position_bm.bm.words);
        put_pool(&mut out, &lps.bytes);
    }

    if let Some(ls) = &packed.leaves {
        out.extend_from_slice(&ls.fixed_size.to_le_bytes());
        out.extend_from_slice(&ls.n.to_le_bytes());
        out.extend_from_slice(&ls.elt_cnt.to_le_bytes());
        put_words(&mut out, &ls.presence_bm.words);
        put_pool(&mut out, &ls.bytes);
    }

    out
}

// ============================================================================
// Decoding
// ============================================================================

/// Byte cursor over the envelope. Every read checks the remaining length
/// before touching (or allocating for) the data.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, section: &'static str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .ok_or(TrieError::SectionOverrun { section })?;
        if end > self.buf.len() {
            return Err(TrieError::Incomplete(end));
        }
        let s = &self.buf[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    fn u8(&mut self, section: &'static str) -> Result<u8> {
        Ok(self.take(1, section)?[0])
    }

    fn u32(&mut self, section: &'static str) -> Result<u32> {
        let b = self.take(4, section)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self, section: &'static str) -> Result<i32> {
        Ok(self.u32(section)? as i32)
    }

    fn words(&mut self, section: &'static str) -> Result<Vec<u64>> {
        let count = self.u32(section)? as usize;
        let raw = self.take(count * 8, section)?;
        let mut words = Vec::with_capacity(count);
        for c in raw.chunks_exact(8) {
            words.push(u64::from_le_bytes([
                c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7],
            ]));
        }
        Ok(words)
    }

    fn pool(&mut self, section: &'static str) -> Result<Vec<u8>> {
        let len = self.u32(section)? as usize;
        Ok(self.take(len, section)?.to_vec())
    }
}

/// Validate a positions bitmap against its pool: one set bit per entry plus
/// a sentinel at the pool end.
fn check_positions(pos: &PositionBitmap, elt_cnt: u32, pool_len: usize) -> Result<()> {
    if pos.total_ones() != elt_cnt + 1 {
        return Err(TrieError::Structural("positions bit count"));
    }
    // With no entries the single set bit is the sentinel itself.
    let sentinel = if elt_cnt == 0 {
        pos.select_index[0] as usize
    } else {
        pos.select_pair(elt_cnt as usize - 1).1
    };
    if sentinel != pool_len {
        return Err(TrieError::Structural("positions sentinel"));
    }
    Ok(())
}

/// Decode a packed trie from an envelope produced by [`encode`].
///
/// Rebuilds all rank/select checkpoints and rejects structurally invalid
/// input with a typed error; the query engine never re-validates.
pub fn decode(buf: &[u8]) -> Result<Packed> {
    let mut r = Reader { buf, pos: 0 };

    let magic = r.take(4, "preamble")?;
    if magic != TRIE_MAGIC {
        return Err(TrieError::InvalidMagic);
    }
    let version = r.u8("preamble")?;
    if version != TRIE_VERSION {
        return Err(TrieError::UnsupportedVersion(version));
    }

    let flags = r.u8("preamble")?;
    let short_size = r.u8("preamble")? as u32;
    let big_inner_cnt = r.u32("preamble")?;
    let big_inner_offset = r.u32("preamble")?;
    let short_minus_inner = r.i32("preamble")?;

    let mut packed = Packed {
        short_size,
        big_inner_cnt,
        big_inner_offset,
        short_minus_inner,
        ..Packed::default()
    };

    if flags & FLAG_NODES != 0 {
        if short_size == 0 || short_size >= INNER_SIZE as u32 {
            return Err(TrieError::Structural("short size out of range"));
        }
        if big_inner_offset as u64 != (BIG_INNER_SIZE - INNER_SIZE) as u64 * big_inner_cnt as u64 {
            return Err(TrieError::Structural("big inner offset"));
        }
        if short_minus_inner != short_size as i32 - INNER_SIZE as i32 {
            return Err(TrieError::Structural("short width delta"));
        }

        packed.node_type_bm = Some(BitmapR64::new(r.words("node_type_bm")?));
        packed.inners = BitmapR128::new(r.words("inners")?);
        packed.short_bm = BitmapR64::new(r.words("short_bm")?);

        let table_len = r.u32("short_table")? as usize;
        let expected = 1usize << short_size;
        if table_len != expected {
            return Err(TrieError::ShortTableSize {
                got: table_len,
                expected,
            });
        }
        let raw = r.take(table_len * 2, "short_table")?;
        packed.short_table = raw
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();

        let elt_cnt = r.u32("inner_prefixes")?;
        let presence_bm = BitmapR128::new(r.words("inner_prefixes")?);
        if presence_bm.total_ones() != elt_cnt {
            return Err(TrieError::Structural("inner prefix presence count"));
        }
        let position_bm = if flags & FLAG_INNER_FULL != 0 {
            Some(PositionBitmap::new(r.words("inner_prefixes")?))
        } else {
            None
        };
        let bytes = r.pool("inner_prefixes")?;
        match &position_bm {
            Some(pos) => check_positions(pos, elt_cnt, bytes.len())?,
            None => {
                if bytes.len() != elt_cnt as usize * 2 {
                    return Err(TrieError::Structural("length-only table size"));
                }
            }
        }
        packed.inner_prefixes = InnerPrefixes {
            elt_cnt,
            presence_bm,
            position_bm,
            bytes,
        };
    }

    if flags & FLAG_LEAF_PREFIXES != 0 {
        let presence_bm = BitmapR64::new(r.words("leaf_prefixes")?);
        let position_bm = PositionBitmap::new(r.words("leaf_prefixes")?);
        let bytes = r.pool("leaf_prefixes")?;
        check_positions(&position_bm, presence_bm.total_ones(), bytes.len())?;
        packed.leaf_prefixes = Some(LeafPrefixes {
            presence_bm,
            position_bm,
            bytes,
        });
    }

    if flags & FLAG_LEAVES != 0 {
        let fixed_size = r.u32("leaves")?;
        let n = r.u32("leaves")?;
        let elt_cnt = r.u32("leaves")?;
        let presence_bm = BitmapR64::new(r.words("leaves")?);
        let bytes = r.pool("leaves")?;
        if presence_bm.total_ones() != elt_cnt || n != elt_cnt {
            return Err(TrieError::LeafStorage("presence count"));
        }
        if bytes.len() as u64 != fixed_size as u64 * elt_cnt as u64 {
            return Err(TrieError::LeafStorage("pool size"));
        }
        packed.leaves = Some(Leaves {
            bytes,
            fixed_size,
            presence_bm,
            n,
            elt_cnt,
        });
    }

    tracing::debug!(
        bytes = buf.len(),
        inners = packed.inner_cnt(),
        nodes = packed.node_cnt(),
        big_inners = packed.big_inner_cnt,
        "packed trie decoded"
    );

    Ok(packed)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_trie_roundtrip() {
        let packed = Packed::default();
        let buf = encode(&packed);
        let decoded = decode(&buf).unwrap();
        assert!(decoded.node_type_bm.is_none());
        assert!(decoded.leaves.is_none());
        assert!(decoded.leaf_prefixes.is_none());
    }

    #[test]
    fn test_invalid_magic() {
        let mut buf = encode(&Packed::default());
        buf[0] = b'X';
        assert!(matches!(decode(&buf), Err(TrieError::InvalidMagic)));
    }

    #[test]
    fn test_unsupported_version() {
        let mut buf = encode(&Packed::default());
        buf[4] = 9;
        assert!(matches!(
            decode(&buf),
            Err(TrieError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_truncated_preamble() {
        let buf = encode(&Packed::default());
        assert!(matches!(
            decode(&buf[..3]),
            Err(TrieError::Incomplete(_))
        ));
    }
}
