//! Space-optimized ordered key index: a succinct trie mapping byte keys to
//! small fixed-size values at around a dozen bits per key.
//!
//! The trie sits in memory in front of a larger on-disk or remote data
//! set: a lookup answers *where a key possibly lives* (an offset, page, or
//! range id), and the caller verifies the key at that location. Depending
//! on the build mode the index is lossy — positive lookups may be false
//! positives, never false negatives over the indexed set.
//!
//! Keys are walked 4 bits at a time (8 at the top levels when the builder
//! emits big nodes) over a bit-packed node stream navigated purely by
//! rank/select — no pointers are stored. Inner nodes come in three
//! physical encodings (big, normal, short-via-table), compressed paths are
//! carried as bit strings or bare lengths, and leaf tails disambiguate
//! keys sharing a path.
//!
//! ```
//! use packtrie::{BuildOpts, PackTrie, U32Codec};
//!
//! let keys = ["Aaron", "Agatha", "Al", "Albert"];
//! let offsets = [0u32, 8, 17, 22];
//! let trie = PackTrie::from_sorted(&keys, &offsets, &BuildOpts::complete(), U32Codec).unwrap();
//!
//! assert_eq!(trie.get(b"Al"), Some(17));
//! assert_eq!(trie.get(b"Alan"), None);
//! let near = trie.search(b"Al");
//! assert_eq!((near.l, near.eq, near.r), (Some(8), Some(17), Some(22)));
//! ```
//!
//! The structure is immutable after build; concurrent readers share it
//! with no synchronization.

pub mod bitmap;
pub mod bitstr;
pub mod build;
pub mod codec;
pub mod error;
pub mod format;
pub mod read;

// ── Read side ────────────────────────────────────────────────────────────────
pub use read::{PackTrie, SearchResult, TrieCounts};

// ── Build side ───────────────────────────────────────────────────────────────
pub use build::{build_from_sorted, BuildOpts, PrefixMode};

// ── Contracts ────────────────────────────────────────────────────────────────
pub use codec::{U16Codec, U32Codec, U64Codec, ValueCodec};
pub use error::{Result, TrieError};
pub use format::{NodeId, Packed};

impl<C: codec::ValueCodec> PackTrie<C> {
    /// Build an index over strictly increasing unique keys and wrap it for
    /// querying.
    pub fn from_sorted<K: AsRef<[u8]>>(
        keys: &[K],
        values: &[C::Value],
        opts: &BuildOpts,
        codec: C,
    ) -> Result<Self> {
        let packed = build::build_from_sorted(keys, values, opts, &codec)?;
        Self::from_packed(packed, codec)
    }
}
