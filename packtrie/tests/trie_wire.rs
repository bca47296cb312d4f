//! Envelope round-trip tests: a decoded trie must behave identically to
//! the one that was encoded, and corrupt envelopes must be rejected with
//! typed errors rather than misbehaving.

use packtrie::{BuildOpts, PackTrie, TrieError, U32Codec, U64Codec};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn random_keys(seed: u64, n: usize) -> Vec<Vec<u8>> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut keys: Vec<Vec<u8>> = (0..n)
        .map(|_| {
            let len = rng.gen_range(0..=9);
            (0..len).map(|_| rng.gen::<u8>()).collect()
        })
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

#[test]
fn test_roundtrip_preserves_every_query_flavor() {
    for opts in [BuildOpts::complete(), BuildOpts::filter()] {
        let keys = random_keys(0xCAFE, 500);
        let values: Vec<u64> = (0..keys.len() as u64).map(|v| v * 3 + 1).collect();
        let built = PackTrie::from_sorted(&keys, &values, &opts, U64Codec).unwrap();

        let buf = built.to_bytes();
        let decoded = PackTrie::from_bytes(&buf, U64Codec).unwrap();

        let mut rng = SmallRng::seed_from_u64(7);
        let mut probes: Vec<Vec<u8>> = keys.clone();
        probes.extend((0..500).map(|_| {
            let len = rng.gen_range(0..=10);
            (0..len).map(|_| rng.gen::<u8>()).collect::<Vec<u8>>()
        }));

        for probe in &probes {
            assert_eq!(built.get(probe), decoded.get(probe));
            assert_eq!(built.get_id(probe), decoded.get_id(probe));
            assert_eq!(built.range_get(probe), decoded.range_get(probe));
            let a = built.search(probe);
            let b = decoded.search(probe);
            assert_eq!((a.l, a.eq, a.r), (b.l, b.eq, b.r));
        }

        assert_eq!(built.counts(), decoded.counts());
        assert_eq!(built.retains_prefix_bits(), decoded.retains_prefix_bits());
        assert_eq!(built.retains_leaf_tails(), decoded.retains_leaf_tails());
    }
}

#[test]
fn test_roundtrip_empty_trie() {
    let keys: [&str; 0] = [];
    let trie = PackTrie::from_sorted(&keys, &[], &BuildOpts::complete(), U32Codec).unwrap();
    let decoded = PackTrie::from_bytes(&trie.to_bytes(), U32Codec).unwrap();
    assert_eq!(decoded.get(b"anything"), None);
    assert_eq!(decoded.counts().nodes, 0);
}

#[test]
fn test_truncated_envelope_is_rejected() {
    let keys = random_keys(1, 50);
    let values: Vec<u32> = (0..keys.len() as u32).collect();
    let trie = PackTrie::from_sorted(&keys, &values, &BuildOpts::complete(), U32Codec).unwrap();
    let buf = trie.to_bytes();

    // Any truncation point must fail loudly, never decode garbage.
    for cut in [0, 3, 5, 8, buf.len() / 2, buf.len() - 1] {
        assert!(
            PackTrie::from_bytes(&buf[..cut], U32Codec).is_err(),
            "cut at {cut}"
        );
    }
}

#[test]
fn test_bad_magic_and_version() {
    let keys = random_keys(2, 20);
    let values: Vec<u32> = (0..keys.len() as u32).collect();
    let trie = PackTrie::from_sorted(&keys, &values, &BuildOpts::complete(), U32Codec).unwrap();

    let mut buf = trie.to_bytes();
    buf[0] = b'Q';
    assert!(matches!(
        PackTrie::from_bytes(&buf, U32Codec),
        Err(TrieError::InvalidMagic)
    ));

    let mut buf = trie.to_bytes();
    buf[4] = 0xEE;
    assert!(matches!(
        PackTrie::from_bytes(&buf, U32Codec),
        Err(TrieError::UnsupportedVersion(0xEE))
    ));
}

#[test]
fn test_tampered_short_size_is_structural_error() {
    let keys = random_keys(3, 100);
    let values: Vec<u32> = (0..keys.len() as u32).collect();
    let trie = PackTrie::from_sorted(&keys, &values, &BuildOpts::complete(), U32Codec).unwrap();

    // Byte 6 is short_size; the stored table no longer matches it.
    let mut buf = trie.to_bytes();
    buf[6] = buf[6].wrapping_add(1);
    assert!(PackTrie::from_bytes(&buf, U32Codec).is_err());
}

#[test]
fn test_codec_width_mismatch_is_rejected() {
    let keys = random_keys(4, 20);
    let values: Vec<u32> = (0..keys.len() as u32).collect();
    let trie = PackTrie::from_sorted(&keys, &values, &BuildOpts::complete(), U32Codec).unwrap();
    let buf = trie.to_bytes();

    assert!(matches!(
        PackTrie::from_bytes(&buf, U64Codec),
        Err(TrieError::LeafStorage(_))
    ));
}
