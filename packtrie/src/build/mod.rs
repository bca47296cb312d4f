//! Builder: a sorted, unique key/value list → the packed representation.
//!
//! Construction is breadth-first on purpose: NodeIds are the BFS visit
//! order, and the child-addressing arithmetic on the read side (NodeId =
//! rank over the inners stream + 1) is only valid because every stored
//! inner bitmap carries exactly one set bit per child edge, laid out in
//! that same order. That also dictates the short-node rule here: a bitmap
//! may only be replaced by a code of equal popcount.
//!
//! ## Shaping
//!
//! Each queue entry is a contiguous key range plus the bit position its
//! node is entered at. The branch point is the first 4-bit-aligned position
//! where the range's first key ends or its first and last keys disagree
//! (sorted input makes those two checks sufficient). Keys ending at the
//! branch point take the terminator branch; everything else groups by its
//! next nibble — or next whole byte for big nodes.
//!
//! ## Big inner chain
//!
//! While every inner emitted so far is big, a node with a large enough key
//! range whose branch byte starts at or after its entry position is
//! emitted as a 257-bit byte-branching node. The first normal inner closes
//! the chain for good, keeping big inners exactly the first inner
//! ordinals.

use rustc_hash::FxHashMap;

use crate::bitmap::{set_bit, BitmapR128, BitmapR64, PositionBitmap};
use crate::bitstr;
use crate::codec::ValueCodec;
use crate::error::{Result, TrieError};
use crate::format::{
    InnerPrefixes, LeafPrefixes, Leaves, Packed, BIG_INNER_SIZE, BIG_WORD_SIZE, INNER_SIZE,
    WORD_SIZE,
};

/// Stored width of a short node's code, in bits.
pub const SHORT_SIZE: usize = 6;

/// Default minimum key-range size for a big (byte-branching) inner node.
pub const DEFAULT_BIG_INNER_THRESHOLD: usize = 256;

// ============================================================================
// Options
// ============================================================================

/// How inner-node compressed paths are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixMode {
    /// Store the prefix bits; mismatching probes fail during descent.
    Full,
    /// Store only the bit count; skipped bits are never compared, trading
    /// false positives for size.
    LengthOnly,
}

/// Build-time options.
#[derive(Debug, Clone)]
pub struct BuildOpts {
    pub inner_prefix_mode: PrefixMode,
    /// Retain key tails on leaves (needed to reject probes that only
    /// diverge past the last branch).
    pub leaf_prefixes: bool,
    /// Minimum key-range size for big inner nodes; `usize::MAX` disables
    /// them.
    pub big_inner_threshold: usize,
}

impl BuildOpts {
    /// Everything retained: no false positives.
    pub fn complete() -> Self {
        Self {
            inner_prefix_mode: PrefixMode::Full,
            leaf_prefixes: true,
            big_inner_threshold: DEFAULT_BIG_INNER_THRESHOLD,
        }
    }

    /// Smallest index: lossy filter, positives must be verified by the
    /// caller.
    pub fn filter() -> Self {
        Self {
            inner_prefix_mode: PrefixMode::LengthOnly,
            leaf_prefixes: false,
            big_inner_threshold: DEFAULT_BIG_INNER_THRESHOLD,
        }
    }
}

impl Default for BuildOpts {
    fn default() -> Self {
        Self::complete()
    }
}

// ============================================================================
// Shaping
// ============================================================================

struct ShapedInner {
    /// First key of the range (prefix bits are read from it).
    lo: usize,
    /// Bit position the node is entered at.
    entry: usize,
    /// Bit position of the node's bitmap.
    branch: usize,
    big: bool,
    /// Set label-bit indexes, ascending (0 = terminator).
    bits: Vec<u16>,
}

struct ShapedLeaf {
    key_idx: usize,
    /// Tail starts at this byte of the key.
    tail_byte: usize,
}

enum Shaped {
    Inner(ShapedInner),
    Leaf(ShapedLeaf),
}

#[inline]
fn nibble_at(key: &[u8], q: usize) -> u8 {
    let b = key[q >> 1];
    if q & 1 == 0 {
        b >> 4
    } else {
        b & 0xF
    }
}

/// First 4-bit-aligned position at or after `pos` where the range's first
/// key ends or its first and last keys disagree.
fn branch_point(first: &[u8], last: &[u8], pos: usize) -> usize {
    let mut q = pos / 4;
    loop {
        let p = q * 4;
        if first.len() * 8 == p || nibble_at(first, q) != nibble_at(last, q) {
            return p;
        }
        q += 1;
    }
}

/// Breadth-first shaping of the whole trie.
fn shape<K: AsRef<[u8]>>(keys: &[K], opts: &BuildOpts) -> Vec<Shaped> {
    let mut nodes: Vec<Shaped> = Vec::with_capacity(keys.len() * 2);
    let mut queue: std::collections::VecDeque<(usize, usize, usize)> =
        std::collections::VecDeque::new();
    queue.push_back((0, keys.len(), 0));
    let mut bigs_open = true;

    while let Some((lo, hi, pos)) = queue.pop_front() {
        let id = nodes.len();
        if hi - lo == 1 && id != 0 {
            nodes.push(Shaped::Leaf(ShapedLeaf {
                key_idx: lo,
                tail_byte: pos >> 3,
            }));
            continue;
        }

        let first = keys[lo].as_ref();
        let last = keys[hi - 1].as_ref();
        let nibble_branch = branch_point(first, last, pos);

        // Big nodes must branch at a byte boundary; branching up to one
        // nibble early is fine, byte labels still separate the keys.
        let mut branch = nibble_branch;
        let mut big = false;
        if bigs_open && hi - lo >= opts.big_inner_threshold && (nibble_branch & !7) >= pos {
            branch = nibble_branch & !7;
            big = true;
        }
        if !big {
            bigs_open = false;
        }
        let word_size = if big { BIG_WORD_SIZE } else { WORD_SIZE };

        let mut bits: Vec<u16> = Vec::new();
        let mut k = lo;
        while k < hi {
            let key = keys[k].as_ref();
            if key.len() * 8 == branch {
                // Only the range's first key can end here (it is a prefix
                // of every other key in the range).
                bits.push(0);
                queue.push_back((k, k + 1, branch));
                k += 1;
                continue;
            }
            let label = if big {
                key[branch >> 3]
            } else {
                nibble_at(key, branch / 4)
            };
            let mut j = k + 1;
            while j < hi {
                let kj = keys[j].as_ref();
                let lj = if big {
                    kj[branch >> 3]
                } else {
                    nibble_at(kj, branch / 4)
                };
                if lj != label {
                    break;
                }
                j += 1;
            }
            bits.push(1 + label as u16);
            queue.push_back((k, j, branch + word_size));
            k = j;
        }

        nodes.push(Shaped::Inner(ShapedInner {
            lo,
            entry: pos,
            branch,
            big,
            bits,
        }));
    }

    nodes
}

// ============================================================================
// Short-table assignment
// ============================================================================

/// Assign `SHORT_SIZE`-bit codes to the most frequent 17-bit bitmaps.
///
/// A code must have the same popcount as the bitmap it expands to (child
/// addressing ranks the stored stream), and bit 16 must be clear (the
/// expansion table is u16 wide). Returns the expansion table and the
/// bitmap→code map.
fn assign_short_codes(nodes: &[Shaped]) -> (Vec<u16>, FxHashMap<u32, u64>) {
    let mut freq: FxHashMap<u32, u32> = FxHashMap::default();
    for node in nodes {
        if let Shaped::Inner(inner) = node {
            if inner.big {
                continue;
            }
            let bm: u32 = inner.bits.iter().fold(0, |acc, &b| acc | 1 << b);
            if bm < 1 << 16 {
                *freq.entry(bm).or_default() += 1;
            }
        }
    }

    // Free codes per popcount class, ascending.
    let mut pools: Vec<Vec<u64>> = vec![Vec::new(); SHORT_SIZE + 1];
    for code in 0..(1u64 << SHORT_SIZE) {
        pools[code.count_ones() as usize].push(code);
    }
    for pool in &mut pools {
        pool.reverse(); // pop from the low end
    }

    let mut by_freq: Vec<(u32, u32)> = freq.into_iter().collect();
    by_freq.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut table = vec![0u16; 1 << SHORT_SIZE];
    let mut codes: FxHashMap<u32, u64> = FxHashMap::default();
    for (bm, _) in by_freq {
        let class = bm.count_ones() as usize;
        if class > SHORT_SIZE {
            continue;
        }
        if let Some(code) = pools[class].pop() {
            table[code as usize] = bm as u16;
            codes.insert(bm, code);
        }
    }

    (table, codes)
}

// ============================================================================
// Build
// ============================================================================

/// Build the packed representation from strictly increasing unique keys and
/// their values.
pub fn build_from_sorted<K: AsRef<[u8]>, C: ValueCodec>(
    keys: &[K],
    values: &[C::Value],
    opts: &BuildOpts,
    codec: &C,
) -> Result<Packed> {
    if keys.len() != values.len() {
        return Err(TrieError::CountMismatch {
            keys: keys.len(),
            values: values.len(),
        });
    }
    for i in 1..keys.len() {
        if keys[i - 1].as_ref() >= keys[i].as_ref() {
            return Err(TrieError::UnsortedKeys(i));
        }
    }
    if keys.is_empty() {
        return Ok(Packed::default());
    }

    let nodes = shape(keys, opts);
    let (short_table, short_codes) = assign_short_codes(&nodes);

    let mut node_type_words: Vec<u64> = Vec::new();
    let mut short_words: Vec<u64> = Vec::new();
    let mut inners_words: Vec<u64> = Vec::new();
    let mut inners_bits = 0usize;

    let mut big_inner_cnt = 0u32;
    let mut short_cnt = 0u32;
    let mut ith_inner = 0u32;
    let mut ith_leaf = 0u32;

    // (inner ordinal, source key, entry, branch) of every prefixed inner.
    let mut prefixed: Vec<(u32, usize, usize, usize)> = Vec::new();
    // (leaf ordinal, key, tail byte) of every tailed leaf.
    let mut tails: Vec<(u32, usize, usize)> = Vec::new();
    let mut value_pool: Vec<u8> = Vec::new();

    for (id, node) in nodes.iter().enumerate() {
        match node {
            Shaped::Inner(inner) => {
                set_bit(&mut node_type_words, id);

                if inner.big {
                    big_inner_cnt += 1;
                    for &b in &inner.bits {
                        set_bit(&mut inners_words, inners_bits + b as usize);
                    }
                    inners_bits += BIG_INNER_SIZE;
                } else {
                    let bm: u32 = inner.bits.iter().fold(0, |acc, &b| acc | 1 << b);
                    if let Some(&code) = short_codes.get(&bm) {
                        set_bit(&mut short_words, ith_inner as usize);
                        short_cnt += 1;
                        for b in 0..SHORT_SIZE {
                            if (code >> b) & 1 == 1 {
                                set_bit(&mut inners_words, inners_bits + b);
                            }
                        }
                        inners_bits += SHORT_SIZE;
                    } else {
                        for &b in &inner.bits {
                            set_bit(&mut inners_words, inners_bits + b as usize);
                        }
                        inners_bits += INNER_SIZE;
                    }
                }

                if inner.branch > inner.entry {
                    prefixed.push((ith_inner, inner.lo, inner.entry, inner.branch));
                }
                ith_inner += 1;
            }
            Shaped::Leaf(leaf) => {
                let key = keys[leaf.key_idx].as_ref();
                if opts.leaf_prefixes && leaf.tail_byte < key.len() {
                    tails.push((ith_leaf, leaf.key_idx, leaf.tail_byte));
                }
                codec.encode(&values[leaf.key_idx], &mut value_pool);
                ith_leaf += 1;
            }
        }
    }

    let node_cnt = nodes.len();
    let inner_cnt = ith_inner as usize;
    let leaf_cnt = ith_leaf;
    pad_words(&mut node_type_words, node_cnt);
    pad_words(&mut short_words, inner_cnt);
    pad_words(&mut inners_words, inners_bits);

    // Inner prefixes, in either form.
    let mut presence_words: Vec<u64> = Vec::new();
    let mut prefix_bytes: Vec<u8> = Vec::new();
    let mut position_words: Vec<u64> = Vec::new();
    for &(ith, lo, entry, branch) in &prefixed {
        set_bit(&mut presence_words, ith as usize);
        match opts.inner_prefix_mode {
            PrefixMode::Full => {
                let base = (entry >> 3) << 3;
                set_bit(&mut position_words, prefix_bytes.len());
                let blob = bitstr::encode(&keys[lo].as_ref()[base >> 3..], branch - base);
                prefix_bytes.extend_from_slice(&blob);
            }
            PrefixMode::LengthOnly => {
                let step = branch - entry;
                let step = u16::try_from(step).map_err(|_| TrieError::PrefixStepOverflow(step))?;
                prefix_bytes.extend_from_slice(&bitstr::enc_step(step));
            }
        }
    }
    pad_words(&mut presence_words, inner_cnt);
    let position_bm = match opts.inner_prefix_mode {
        PrefixMode::Full => {
            set_bit(&mut position_words, prefix_bytes.len());
            Some(PositionBitmap::new(position_words))
        }
        PrefixMode::LengthOnly => None,
    };
    let inner_prefixes = InnerPrefixes {
        elt_cnt: prefixed.len() as u32,
        presence_bm: BitmapR128::new(presence_words),
        position_bm,
        bytes: prefix_bytes,
    };

    // Leaf tails.
    let leaf_prefixes = if opts.leaf_prefixes {
        let mut presence_words: Vec<u64> = Vec::new();
        let mut pool: Vec<u8> = Vec::new();
        let mut position_words: Vec<u64> = Vec::new();
        for &(ith, key_idx, tail_byte) in &tails {
            set_bit(&mut presence_words, ith as usize);
            set_bit(&mut position_words, pool.len());
            pool.extend_from_slice(&keys[key_idx].as_ref()[tail_byte..]);
        }
        set_bit(&mut position_words, pool.len());
        pad_words(&mut presence_words, leaf_cnt as usize);
        Some(LeafPrefixes {
            presence_bm: BitmapR64::new(presence_words),
            position_bm: PositionBitmap::new(position_words),
            bytes: pool,
        })
    } else {
        None
    };

    // Values: every leaf ordinal is present after a build.
    let mut leaf_presence: Vec<u64> = Vec::new();
    for i in 0..leaf_cnt {
        set_bit(&mut leaf_presence, i as usize);
    }
    pad_words(&mut leaf_presence, leaf_cnt as usize);
    let leaves = Leaves {
        bytes: value_pool,
        fixed_size: codec.encoded_size() as u32,
        presence_bm: BitmapR64::new(leaf_presence),
        n: leaf_cnt,
        elt_cnt: leaf_cnt,
    };

    tracing::debug!(
        keys = keys.len(),
        nodes = node_cnt,
        inners = inner_cnt,
        big_inners = big_inner_cnt,
        short_inners = short_cnt,
        stream_bits = inners_bits,
        "packed trie built"
    );

    Ok(Packed {
        node_type_bm: Some(BitmapR64::new(node_type_words)),
        inners: BitmapR128::new(inners_words),
        short_bm: BitmapR64::new(short_words),
        short_table,
        big_inner_cnt,
        short_size: SHORT_SIZE as u32,
        big_inner_offset: ((BIG_INNER_SIZE - INNER_SIZE) * big_inner_cnt as usize) as u32,
        short_minus_inner: SHORT_SIZE as i32 - INNER_SIZE as i32,
        inner_prefixes,
        leaf_prefixes,
        leaves: Some(leaves),
    })
}

/// Grow a word vector to cover `bits` bits (set bits never land past the
/// end, but trailing zero words must exist for rank construction).
fn pad_words(words: &mut Vec<u64>, bits: usize) {
    let need = bits.div_ceil(64);
    if words.len() < need {
        words.resize(need, 0);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn shape_keys(keys: &[&str]) -> Vec<Shaped> {
        shape(keys, &BuildOpts::complete())
    }

    #[test]
    fn test_branch_point_at_divergence() {
        // "ab" vs "ax": 'b'=0x62, 'x'=0x78 → high nibbles differ at q=2.
        assert_eq!(branch_point(b"ab", b"ax", 0), 8);
        // "ab" vs "ac": 0x62 vs 0x63 → low nibbles differ at q=3.
        assert_eq!(branch_point(b"ab", b"ac", 0), 12);
    }

    #[test]
    fn test_branch_point_at_key_end() {
        assert_eq!(branch_point(b"ab", b"abc", 0), 16);
        assert_eq!(branch_point(b"", b"xyz", 0), 0);
    }

    #[test]
    fn test_shape_single_key_root_is_inner() {
        let nodes = shape_keys(&["ab"]);
        assert_eq!(nodes.len(), 2);
        match &nodes[0] {
            Shaped::Inner(inner) => {
                assert_eq!(inner.entry, 0);
                assert_eq!(inner.branch, 16);
                assert_eq!(inner.bits, vec![0]); // terminator only
            }
            Shaped::Leaf(_) => panic!("root must be inner"),
        }
        match &nodes[1] {
            Shaped::Leaf(leaf) => assert_eq!(leaf.tail_byte, 2), // empty tail
            Shaped::Inner(_) => panic!("expected leaf"),
        }
    }

    #[test]
    fn test_shape_terminator_and_sibling() {
        // "ab" ends where "abc" branches: terminator + nibble child.
        let nodes = shape_keys(&["ab", "abc"]);
        match &nodes[0] {
            Shaped::Inner(inner) => {
                assert_eq!(inner.branch, 16);
                // 'c' = 0x63 → high nibble 6 → label bit 7.
                assert_eq!(inner.bits, vec![0, 7]);
            }
            Shaped::Leaf(_) => panic!("root must be inner"),
        }
    }

    #[test]
    fn test_shape_bfs_order() {
        // Two branch levels; children must be numbered level by level.
        let nodes = shape_keys(&["aa", "ab", "ba"]);
        // Root branches 'a'/'b' at q=0 (0x61 vs 0x62 → nibble q=1 differs:
        // branch at bit 4): children are inner{aa,ab} and leaf{ba}.
        assert!(matches!(nodes[0], Shaped::Inner(_)));
        assert!(matches!(nodes[1], Shaped::Inner(_)));
        assert!(matches!(nodes[2], Shaped::Leaf(_)));
        assert!(matches!(nodes[3], Shaped::Leaf(_)));
        assert!(matches!(nodes[4], Shaped::Leaf(_)));
        assert_eq!(nodes.len(), 5);
    }

    #[test]
    fn test_short_codes_preserve_popcount() {
        let keys = ["aa", "ab", "ba", "bb", "ca", "cb"];
        let nodes = shape_keys(&keys);
        let (table, codes) = assign_short_codes(&nodes);
        assert_eq!(table.len(), 1 << SHORT_SIZE);
        assert!(!codes.is_empty());
        for (bm, code) in &codes {
            assert_eq!(
                bm.count_ones(),
                code.count_ones(),
                "code {code:#b} for bitmap {bm:#b}"
            );
            assert_eq!(table[*code as usize] as u32, *bm);
        }
    }

    #[test]
    fn test_short_codes_skip_bit16_bitmaps() {
        // A node branching on label 0xf has bit 16 set and cannot expand
        // through a u16 table; it must stay unshorted.
        let keys: [&[u8]; 2] = [b"a\x0f", b"a\xf0"];
        let nodes = shape(&keys, &BuildOpts::complete());
        let (_, codes) = assign_short_codes(&nodes);
        assert!(codes.is_empty());
    }

    #[test]
    fn test_build_rejects_unsorted() {
        let err = build_from_sorted(
            &["b", "a"],
            &[1u32, 2],
            &BuildOpts::complete(),
            &crate::codec::U32Codec,
        )
        .unwrap_err();
        assert!(matches!(err, TrieError::UnsortedKeys(1)));
    }

    #[test]
    fn test_build_rejects_duplicates() {
        let err = build_from_sorted(
            &["a", "a"],
            &[1u32, 2],
            &BuildOpts::complete(),
            &crate::codec::U32Codec,
        )
        .unwrap_err();
        assert!(matches!(err, TrieError::UnsortedKeys(1)));
    }

    #[test]
    fn test_build_rejects_count_mismatch() {
        let err = build_from_sorted(
            &["a", "b"],
            &[1u32],
            &BuildOpts::complete(),
            &crate::codec::U32Codec,
        )
        .unwrap_err();
        assert!(matches!(err, TrieError::CountMismatch { keys: 2, values: 1 }));
    }

    #[test]
    fn test_build_empty_is_empty_packed() {
        let keys: [&str; 0] = [];
        let packed =
            build_from_sorted(&keys, &[], &BuildOpts::complete(), &crate::codec::U32Codec)
                .unwrap();
        assert!(packed.node_type_bm.is_none());
        assert!(packed.leaves.is_none());
    }

    #[test]
    fn test_length_only_step_overflow() {
        // A shared prefix of 16 KiB pushes the step far past u16 in
        // length-only mode.
        let long = vec![b'x'; 16 * 1024];
        let mut k1 = long.clone();
        k1.push(b'a');
        let mut k2 = long;
        k2.push(b'b');
        let err = build_from_sorted(
            &[k1, k2],
            &[1u32, 2],
            &BuildOpts::filter(),
            &crate::codec::U32Codec,
        )
        .unwrap_err();
        assert!(matches!(err, TrieError::PrefixStepOverflow(_)));
    }

    #[test]
    fn test_big_inner_chain_is_prefix_of_ordinals() {
        // 256 single-byte keys force a byte-branching root.
        let keys: Vec<Vec<u8>> = (0..=255u8).map(|b| vec![b]).collect();
        let values: Vec<u32> = (0..=255u32).collect();
        let mut opts = BuildOpts::complete();
        opts.big_inner_threshold = 128;
        let packed = build_from_sorted(&keys, &values, &opts, &crate::codec::U32Codec).unwrap();
        assert_eq!(packed.big_inner_cnt, 1);
        assert_eq!(
            packed.big_inner_offset as usize,
            BIG_INNER_SIZE - INNER_SIZE
        );
    }
}
