//! Leaf store: key tails and fixed-size value payloads by leaf ordinal.

use crate::codec::ValueCodec;
use crate::format::Packed;

/// Stored key tail of leaf ordinal `ith_leaf`, if any.
///
/// Tails are raw bytes (no bit-length marker): they start at the byte
/// boundary of the leaf's reach position, so byte comparison against the
/// probe tail is exact.
pub(crate) fn leaf_prefix(p: &Packed, ith_leaf: u32) -> Option<&[u8]> {
    let lps = p.leaf_prefixes.as_ref()?;
    let (ith_pref, present) = lps.presence_bm.rank(ith_leaf as usize);
    if !present {
        return None;
    }
    let (from, to) = lps.position_bm.select_pair(ith_pref as usize);
    Some(&lps.bytes[from..to])
}

/// Decode the value stored for leaf ordinal `ith_leaf`.
pub(crate) fn leaf_value<C: ValueCodec>(p: &Packed, codec: &C, ith_leaf: u32) -> Option<C::Value> {
    let ls = p.leaves.as_ref()?;
    ls.get(ith_leaf).map(|bytes| codec.decode(bytes))
}
