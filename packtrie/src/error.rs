//! Error types for building and loading packed tries.
//!
//! Queries on a loaded trie are total and report misses through `Option`;
//! `Result` appears only at the build and wire-decode seams.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrieError {
    /// Input keys are not strictly increasing unique byte strings.
    #[error("keys not sorted/unique at index {0}")]
    UnsortedKeys(usize),

    /// Key and value slices differ in length.
    #[error("key/value count mismatch: {keys} keys, {values} values")]
    CountMismatch { keys: usize, values: usize },

    /// A length-only prefix step exceeds the u16 wire field.
    ///
    /// Build with `PrefixMode::Full` to index keys with compressed runs
    /// longer than 65535 bits.
    #[error("length-only prefix step {0} overflows u16")]
    PrefixStepOverflow(usize),

    /// Not enough bytes in the buffer; need at least this many total.
    #[error("incomplete envelope: need at least {0} bytes")]
    Incomplete(usize),

    /// Envelope has wrong magic bytes.
    #[error("invalid magic bytes")]
    InvalidMagic,

    /// Envelope version not supported by this decoder.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),

    /// A declared section length exceeds the remaining buffer.
    #[error("section overruns buffer: {section}")]
    SectionOverrun { section: &'static str },

    /// Short-expansion table size does not match `1 << short_size`.
    #[error("short table has {got} entries, expected {expected}")]
    ShortTableSize { got: usize, expected: usize },

    /// Rank/select layout or derived-constant invariants violated.
    #[error("structurally invalid packed input: {0}")]
    Structural(&'static str),

    /// Leaf pool size is not a multiple of the fixed value size, or the
    /// codec's size disagrees with the stored one.
    #[error("leaf pool inconsistent: {0}")]
    LeafStorage(&'static str),
}

pub type Result<T> = std::result::Result<T, TrieError>;
