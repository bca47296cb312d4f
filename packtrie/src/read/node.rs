//! Node decoder: from a dense NodeId to a decoded view of one node.
//!
//! Nothing is materialized beyond a small borrowed aggregate; the packed
//! arrays stay untouched. Decoding is rank arithmetic:
//!
//! 1. Rank the node-type bitmap → inner ordinal or leaf ordinal.
//! 2. Big nodes (the first `big_inner_cnt` inner ordinals) sit at
//!    `ith * 257`; other nodes at `big_inner_offset + 17 * ith` corrected
//!    by the width deficit of each preceding short node.
//! 3. Short nodes expand their stored code through the global short table.
//! 4. Prefix presence is ranked per inner ordinal; the blob (or the
//!    2-byte step) is located by select over the positions bitmap.

use crate::bitmap::read_bits;
use crate::bitstr;
use crate::format::{NodeId, Packed, BIG_INNER_SIZE, BIG_WORD_SIZE, INNER_SIZE, WORD_SIZE};
use crate::read::leaves;

/// One decoded node, borrowed from the packed arrays.
pub(crate) enum DecodedNode<'a> {
    Inner(InnerNode<'a>),
    Leaf(LeafNode<'a>),
}

/// Decoded view of an inner node.
pub(crate) struct InnerNode<'a> {
    pub ith_inner: u32,
    /// Bit range `[from, to)` of the stored bitmap in the inners stream.
    pub from: usize,
    pub to: usize,
    /// Label width: 4, or 8 for big nodes.
    pub word_size: usize,
    /// Expanded 17-bit bitmap, for short nodes only. Normal and big nodes
    /// read their bitmap straight from the stream when needed.
    pub short_bm: Option<u64>,
    pub prefix: InnerPrefix<'a>,
}

/// An inner node's compressed-path information.
pub(crate) enum InnerPrefix<'a> {
    None,
    /// Full form: marker-terminated bit string plus its payload length.
    Bits { blob: &'a [u8], bits: usize },
    /// Length-only form: a step to add to the bit cursor, sight unseen.
    Len(usize),
}

/// Decoded view of a leaf node.
pub(crate) struct LeafNode<'a> {
    pub ith_leaf: u32,
    /// Stored key tail, if any.
    pub prefix: Option<&'a [u8]>,
}

/// Decode `node_id`. The caller guarantees the trie is non-empty and the
/// id is in range (ids only ever come from descending a valid structure).
pub(crate) fn decode_node(p: &Packed, node_id: NodeId) -> DecodedNode<'_> {
    let ntbm = p
        .node_type_bm
        .as_ref()
        .expect("decode_node on empty trie");
    let (ith_inner, is_inner) = ntbm.rank(node_id as usize);

    if !is_inner {
        let ith_leaf = node_id - ith_inner;
        return DecodedNode::Leaf(LeafNode {
            ith_leaf,
            prefix: leaves::leaf_prefix(p, ith_leaf),
        });
    }

    let (from, to, word_size, short_bm) = if ith_inner < p.big_inner_cnt {
        let from = ith_inner as usize * BIG_INNER_SIZE;
        (from, from + BIG_INNER_SIZE, BIG_WORD_SIZE, None)
    } else {
        let (ith_short, is_short) = p.short_bm.rank(ith_inner as usize);
        let from = p.inner_from(ith_inner, ith_short);
        if is_short {
            let width = p.short_size as usize;
            let code = read_bits(&p.inners.words, from, width);
            let bm = p.short_table[code as usize] as u64;
            (from, from + width, WORD_SIZE, Some(bm))
        } else {
            (from, from + INNER_SIZE, WORD_SIZE, None)
        }
    };

    DecodedNode::Inner(InnerNode {
        ith_inner,
        from,
        to,
        word_size,
        short_bm,
        prefix: inner_prefix(p, ith_inner),
    })
}

/// Resolve the prefix entry of inner ordinal `ith_inner`, if present.
fn inner_prefix(p: &Packed, ith_inner: u32) -> InnerPrefix<'_> {
    let ips = &p.inner_prefixes;
    if ips.elt_cnt == 0 || !ips.presence_bm.bit(ith_inner as usize) {
        return InnerPrefix::None;
    }
    let (ith_pref, _) = ips.presence_bm.rank(ith_inner as usize);

    match &ips.position_bm {
        Some(pos) => {
            let (from, to) = pos.select_pair(ith_pref as usize);
            let blob = &ips.bytes[from..to];
            InnerPrefix::Bits {
                blob,
                bits: bitstr::bit_len(blob),
            }
        }
        None => InnerPrefix::Len(bitstr::dec_step(&ips.bytes[ith_pref as usize * 2..])),
    }
}
