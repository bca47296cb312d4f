//! Query engine: exact, three-way (predecessor / equal / successor), and
//! range-containment lookups.
//!
//! All three flavors share one descent loop. A bit cursor `i` walks the
//! probe key while NodeIds are derived purely from rank over the inners
//! stream: the number of set bits before a child's edge bit *is* that
//! child's position in BFS order, so `rank + 1` is its NodeId. No pointer
//! arrays exist anywhere.
//!
//! The three-way search additionally tracks the nearest sibling subtrees on
//! either side of the descent path and, after the loop, drills them down to
//! their rightmost / leftmost leaves.

use std::cmp::Ordering;

use crate::bitmap::mask_low;
use crate::bitstr;
use crate::format::{NodeId, Packed, BIG_WORD_SIZE};
use crate::read::node::{decode_node, DecodedNode, InnerNode, InnerPrefix, LeafNode};

// ============================================================================
// Descent helpers
// ============================================================================

/// Probe bytes from the cursor's byte boundary onward. Saturates on a
/// cursor past the key end (reachable only with a corrupt structure, which
/// may answer wrong but must not panic).
#[inline]
fn tail(key: &[u8], i: usize) -> &[u8] {
    key.get(i >> 3..).unwrap_or(&[])
}

/// Label-bit index for the cursor position: 0 is the terminator branch, a
/// spent key always takes it; otherwise `1 + label`, where the label is the
/// next nibble (high-first within each byte) or, for big nodes, the next
/// whole byte.
#[inline]
fn label_index(key: &[u8], key_bit_len: usize, i: usize, word_size: usize) -> usize {
    if i >= key_bit_len {
        return 0;
    }
    if word_size == BIG_WORD_SIZE {
        1 + key[i >> 3] as usize
    } else {
        let b = key[i >> 3];
        let nib = if i & 7 < 4 { b >> 4 } else { b & 0xF };
        1 + nib as usize
    }
}

/// Rank of the child left of `label`, and whether `label` itself has a
/// child.
///
/// The returned rank counts every child edge in the whole stream before
/// this label's edge, so `rank + 1` is the left sibling's NodeId and
/// `rank + has + 1` the matched child's. Short nodes rank their stored
/// code's start and count inside the expanded bitmap; the two agree
/// because a short code carries one set bit per child, same as the bitmap
/// it expands to.
#[inline]
fn child_at(p: &Packed, n: &InnerNode<'_>, label: usize) -> (u32, bool) {
    match n.short_bm {
        Some(bm) => {
            let (r0, _) = p.inners.rank(n.from);
            let below = (bm & mask_low(label)).count_ones();
            (r0 + below, (bm >> label) & 1 == 1)
        }
        None => p.inners.rank(n.from + label),
    }
}

/// Descend to the leftmost leaf under `id`.
fn left_most(p: &Packed, mut id: NodeId) -> NodeId {
    loop {
        match decode_node(p, id) {
            DecodedNode::Leaf(_) => return id,
            DecodedNode::Inner(n) => {
                let (r0, _) = p.inners.rank(n.from);
                id = r0 + 1;
            }
        }
    }
}

/// Descend to the rightmost leaf under `id`.
fn right_most(p: &Packed, mut id: NodeId) -> NodeId {
    loop {
        match decode_node(p, id) {
            DecodedNode::Leaf(_) => return id,
            DecodedNode::Inner(n) => {
                let (r0, bit) = p.inners.rank(n.to - 1);
                id = r0 + bit as u32;
            }
        }
    }
}

// ============================================================================
// Exact lookup
// ============================================================================

/// Exact lookup: the leaf NodeId the key descends to, or `None`.
///
/// With leaf tails retained a returned id is a true match up to the bits
/// the index kept; in length-only prefix mode skipped bits are never
/// compared, which is where false positives come from.
pub(crate) fn get_id(p: &Packed, key: &[u8]) -> Option<NodeId> {
    p.node_type_bm.as_ref()?;

    let l = key.len() * 8;
    let mut i = 0usize;
    let mut eq: NodeId = 0;
    let mut reached: Option<LeafNode<'_>> = None;

    loop {
        let node = match decode_node(p, eq) {
            DecodedNode::Leaf(leaf) => {
                reached = Some(leaf);
                break;
            }
            DecodedNode::Inner(node) => node,
        };

        match node.prefix {
            InnerPrefix::Bits { blob, bits } => {
                if bitstr::cmp_upto(tail(key, i), blob) != Ordering::Equal {
                    return None;
                }
                i = (i & !7) + bits;
            }
            InnerPrefix::Len(step) => i += step,
            InnerPrefix::None => {}
        }
        if i > l {
            return None;
        }

        let label = label_index(key, l, i, node.word_size);
        let (left, has) = child_at(p, &node, label);
        if !has {
            return None;
        }
        eq = left + 1;

        if i == l {
            // Key spent exactly: the terminator branch was taken, and a
            // terminator leaf stores no tail, so there is nothing left to
            // reconcile.
            break;
        }
        i += node.word_size;
    }

    if p.leaf_prefixes.is_some() {
        let stored = reached.and_then(|leaf| leaf.prefix).unwrap_or(&[]);
        if tail(key, i) != stored {
            return None;
        }
    }

    Some(eq)
}

// ============================================================================
// Three-way search
// ============================================================================

/// Three-way search: leaf ids of (greatest < key, equal, smallest > key).
pub(crate) fn search_ids(
    p: &Packed,
    key: &[u8],
) -> (Option<NodeId>, Option<NodeId>, Option<NodeId>) {
    if p.node_type_bm.is_none() {
        return (None, None, None);
    }

    let l = key.len() * 8;
    let mut i = 0usize;
    let mut l_id: Option<NodeId> = None;
    let mut r_id: Option<NodeId> = None;
    let mut eq: NodeId = 0;
    let mut eq_valid = true;
    let mut reached: Option<LeafNode<'_>> = None;

    loop {
        let node = match decode_node(p, eq) {
            DecodedNode::Leaf(leaf) => {
                reached = Some(leaf);
                break;
            }
            DecodedNode::Inner(node) => node,
        };

        match node.prefix {
            InnerPrefix::Bits { blob, bits } => match bitstr::cmp_upto(tail(key, i), blob) {
                Ordering::Equal => i = (i & !7) + bits,
                Ordering::Less => {
                    // Every key under here extends a prefix greater than
                    // the probe.
                    r_id = Some(eq);
                    eq_valid = false;
                    break;
                }
                Ordering::Greater => {
                    l_id = Some(eq);
                    eq_valid = false;
                    break;
                }
            },
            InnerPrefix::Len(step) => {
                i += step;
                if i > l {
                    // Probe ran out inside the skipped run: every key under
                    // here is longer, hence greater (the builder never lets
                    // a skipped run span a key end).
                    r_id = Some(eq);
                    eq_valid = false;
                    break;
                }
            }
            InnerPrefix::None => {}
        }

        let label = label_index(key, l, i, node.word_size);
        let (left, has) = child_at(p, &node, label);
        let matched = left + has as u32;
        let right = matched + 1;

        // Nearest sibling subtrees on either side of the descent, if they
        // exist within this node's child range.
        let (r0, _) = p.inners.rank(node.from);
        let left_most_child = r0 + 1;
        let (r1, bit) = p.inners.rank(node.to - 1);
        let right_most_child = r1 + bit as u32;
        if left >= left_most_child && left <= right_most_child {
            l_id = Some(left);
        }
        if right >= left_most_child && right <= right_most_child {
            r_id = Some(right);
        }

        if !has {
            eq_valid = false;
            break;
        }
        eq = matched;

        if i == l {
            break;
        }
        i += node.word_size;
    }

    // Reconcile the probe tail with the reached leaf's stored tail; an
    // ordering mismatch converts the equality into a neighbor.
    if eq_valid && i <= l && p.leaf_prefixes.is_some() {
        let stored = reached.as_ref().and_then(|leaf| leaf.prefix).unwrap_or(&[]);
        match tail(key, i).cmp(stored) {
            Ordering::Less => {
                r_id = Some(eq);
                eq_valid = false;
            }
            Ordering::Greater => {
                l_id = Some(eq);
                eq_valid = false;
            }
            Ordering::Equal => {}
        }
    }

    // The tracked neighbors are subtree roots; resolve them to leaves.
    let l_leaf = l_id.map(|id| right_most(p, id));
    let r_leaf = r_id.map(|id| left_most(p, id));
    let eq_leaf = eq_valid.then_some(eq);

    (l_leaf, eq_leaf, r_leaf)
}
