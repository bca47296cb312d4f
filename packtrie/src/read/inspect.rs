//! Structural dump of a packed trie, one line per node.
//!
//! Intended for tests and debugging only; this is the one consumer that
//! materializes node bitmaps (via [`crate::bitmap::slice`]) instead of
//! ranking into them.

use std::fmt::Write as _;

use crate::bitmap::slice;
use crate::format::Packed;
use crate::read::node::{decode_node, DecodedNode, InnerPrefix};

/// Render every node: id, kind, labels, prefix info, leaf tails.
///
/// ```text
/// #0 inner labels=[$ 6] prefix=8bits "a…"
/// #1 leaf
/// #2 leaf tail=6263
/// ```
///
/// `$` is the terminator branch; other labels print as hex.
pub fn dump(p: &Packed) -> String {
    let mut out = String::new();
    if p.node_type_bm.is_none() {
        out.push_str("(empty trie)\n");
        return out;
    }

    for id in 0..p.node_cnt() {
        match decode_node(p, id) {
            DecodedNode::Leaf(leaf) => {
                let _ = write!(out, "#{id} leaf");
                if let Some(tail) = leaf.prefix {
                    let _ = write!(out, " tail={}", hex(tail));
                }
                out.push('\n');
            }
            DecodedNode::Inner(node) => {
                let kind = if node.word_size == 8 {
                    " big"
                } else if node.short_bm.is_some() {
                    " short"
                } else {
                    ""
                };
                let _ = write!(out, "#{id} inner{kind} labels=[");
                // Short nodes expand to 17 logical label bits.
                let (bm, width) = match node.short_bm {
                    Some(bm) => (vec![bm], 17),
                    None => (
                        slice(&p.inners.words, node.from, node.to),
                        node.to - node.from,
                    ),
                };
                let mut first = true;
                for b in 0..width {
                    if (bm[b >> 6] >> (b & 63)) & 1 == 0 {
                        continue;
                    }
                    if !first {
                        out.push(' ');
                    }
                    first = false;
                    if b == 0 {
                        out.push('$');
                    } else {
                        let _ = write!(out, "{:x}", b - 1);
                    }
                }
                out.push(']');
                match node.prefix {
                    InnerPrefix::None => {}
                    InnerPrefix::Bits { blob, bits } => {
                        let _ = write!(out, " prefix={bits}bits {}", hex(blob));
                    }
                    InnerPrefix::Len(step) => {
                        let _ = write!(out, " step={step}");
                    }
                }
                out.push('\n');
            }
        }
    }
    out
}

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}
