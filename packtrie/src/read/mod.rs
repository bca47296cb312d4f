//! Read-side runtime: the query handle over an immutable packed trie.
//!
//! [`PackTrie`] owns the packed arrays and a value codec and exposes the
//! lookup flavors. It never mutates after construction; concurrent readers
//! share it freely behind `&self`.

pub mod inspect;
mod leaves;
mod node;
mod query;

use crate::codec::ValueCodec;
use crate::error::{Result, TrieError};
use crate::format::{wire, NodeId, Packed};

/// Values of the nearest neighbors and the match itself, any of which may
/// be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult<V> {
    /// Value of the greatest key `< probe`; `None` if the probe is the
    /// smallest.
    pub l: Option<V>,
    /// Value of the probe's own key; `None` without a match.
    pub eq: Option<V>,
    /// Value of the smallest key `> probe`; `None` if the probe is the
    /// greatest.
    pub r: Option<V>,
}

/// Node/leaf tallies, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrieCounts {
    pub nodes: u32,
    pub inners: u32,
    pub leaves: u32,
    pub big_inners: u32,
    pub short_inners: u32,
}

/// A loaded, immutable packed trie with its value codec.
///
/// The index is lossy by design: it answers where a key *possibly* is.
/// Depending on the build mode a positive lookup may be a false positive;
/// callers verify the key at the location the value points at.
#[derive(Debug, Clone)]
pub struct PackTrie<C: ValueCodec> {
    packed: Packed,
    codec: C,
}

impl<C: ValueCodec> PackTrie<C> {
    /// Wrap an already-validated packed structure.
    ///
    /// Fails if the codec's width disagrees with the stored leaf slot
    /// width.
    pub fn from_packed(packed: Packed, codec: C) -> Result<Self> {
        if let Some(ls) = &packed.leaves {
            if ls.fixed_size as usize != codec.encoded_size() {
                return Err(TrieError::LeafStorage("codec width"));
            }
        }
        Ok(Self { packed, codec })
    }

    /// Decode a trie from its wire envelope.
    pub fn from_bytes(buf: &[u8], codec: C) -> Result<Self> {
        Self::from_packed(wire::decode(buf)?, codec)
    }

    /// Serialize to the wire envelope.
    pub fn to_bytes(&self) -> Vec<u8> {
        wire::encode(&self.packed)
    }

    /// Exact lookup.
    ///
    /// `None` iff the trie cannot match `key`; a `Some` may be a false
    /// positive if the trie was built without full prefix retention.
    pub fn get(&self, key: &[u8]) -> Option<C::Value> {
        let id = query::get_id(&self.packed, key)?;
        self.node_value(id)
    }

    /// Exact lookup returning the stable leaf NodeId instead of the value.
    pub fn get_id(&self, key: &[u8]) -> Option<NodeId> {
        query::get_id(&self.packed, key)
    }

    /// Locate the range containing `key`: its exact value if present, else
    /// the value at the greatest key below it ("start of the containing
    /// range"). `None` when `key` sorts below everything indexed.
    pub fn range_get(&self, key: &[u8]) -> Option<C::Value> {
        let (l, eq, _) = query::search_ids(&self.packed, key);
        if let Some(id) = eq {
            return self.node_value(id);
        }
        self.node_value(l?)
    }

    /// Neighbor search: values at the greatest key `<`, the key itself,
    /// and the smallest key `>` the probe.
    pub fn search(&self, key: &[u8]) -> SearchResult<C::Value> {
        let (l, eq, r) = query::search_ids(&self.packed, key);
        SearchResult {
            l: l.and_then(|id| self.node_value(id)),
            eq: eq.and_then(|id| self.node_value(id)),
            r: r.and_then(|id| self.node_value(id)),
        }
    }

    /// Whether inner prefixes retain their bits (no false positives from
    /// skipped runs). Diagnostic only; query semantics are identical.
    pub fn retains_prefix_bits(&self) -> bool {
        self.packed.node_type_bm.is_none() || self.packed.inner_prefixes.position_bm.is_some()
    }

    /// Whether leaf tails were retained. Diagnostic only.
    pub fn retains_leaf_tails(&self) -> bool {
        self.packed.leaf_prefixes.is_some()
    }

    /// Node tallies.
    pub fn counts(&self) -> TrieCounts {
        let p = &self.packed;
        let inners = p.inner_cnt();
        TrieCounts {
            nodes: p.node_cnt(),
            inners,
            leaves: p.node_cnt() - inners,
            big_inners: p.big_inner_cnt,
            short_inners: p.short_bm.total_ones(),
        }
    }

    /// Multi-line structural dump, for tests and debugging.
    pub fn dump(&self) -> String {
        inspect::dump(&self.packed)
    }

    /// Borrow the packed representation.
    pub fn packed(&self) -> &Packed {
        &self.packed
    }

    /// Value stored at a leaf NodeId previously returned by a lookup.
    fn node_value(&self, id: NodeId) -> Option<C::Value> {
        let ntbm = self.packed.node_type_bm.as_ref()?;
        let (ith_inner, is_inner) = ntbm.rank(id as usize);
        if is_inner {
            // Lookups only ever hand out leaf ids.
            return None;
        }
        leaves::leaf_value(&self.packed, &self.codec, id - ith_inner)
    }
}
