//! Point/neighbor lookup benchmark for the packed trie.
//!
//! Measures build time, per-query latency for the three lookup flavors,
//! and the bits-per-key footprint of both retention modes.
//!
//! Run with: cargo run --release -p bench-trie-lookup

use std::hint::black_box;
use std::time::Instant;

use packtrie::{BuildOpts, PackTrie, U64Codec};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

// ============================================================================
// Configuration
// ============================================================================

/// Number of keys in the index.
const KEY_COUNT: usize = 200_000;

/// Queries per measured batch.
const QUERIES: usize = 200_000;

/// Measured batches per flavor (the median is reported).
const ITERATIONS: usize = 5;

// ============================================================================
// Data generation
// ============================================================================

/// URL-ish keys: a handful of host prefixes, then random path segments.
/// Heavy shared prefixes are the workload this index exists for.
fn generate_keys(count: usize, seed: u64) -> Vec<Vec<u8>> {
    let hosts = [
        "api.example.com/v2/",
        "cdn.example.com/assets/",
        "img.example.net/thumbs/",
        "www.example.org/wiki/",
    ];
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut keys: Vec<Vec<u8>> = (0..count * 2)
        .map(|_| {
            let mut k = hosts[rng.gen_range(0..hosts.len())].as_bytes().to_vec();
            let segments = rng.gen_range(1..=3);
            for _ in 0..segments {
                let len = rng.gen_range(3..=10);
                for _ in 0..len {
                    k.push(b"abcdefghijklmnopqrstuvwxyz0123456789-_"[rng.gen_range(0..38)]);
                }
                k.push(b'/');
            }
            k
        })
        .collect();
    keys.sort();
    keys.dedup();
    keys.truncate(count);
    keys
}

fn median(mut samples: Vec<f64>) -> f64 {
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
    samples[samples.len() / 2]
}

fn bench<F: FnMut() -> u64>(name: &str, queries: usize, mut run: F) {
    let mut per_batch = Vec::with_capacity(ITERATIONS);
    for _ in 0..ITERATIONS {
        let start = Instant::now();
        let checksum = run();
        let elapsed = start.elapsed();
        black_box(checksum);
        per_batch.push(elapsed.as_nanos() as f64 / queries as f64);
    }
    println!("  {name:<28} {:>8.1} ns/op", median(per_batch));
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let keys = generate_keys(KEY_COUNT, 42);
    let values: Vec<u64> = (0..keys.len() as u64).map(|i| i * 64).collect();
    println!("keys: {} (example: {:?})", keys.len(), String::from_utf8_lossy(&keys[0]));

    let mut rng = SmallRng::seed_from_u64(1);
    let hit_probes: Vec<&[u8]> = (0..QUERIES)
        .map(|_| keys[rng.gen_range(0..keys.len())].as_slice())
        .collect();
    let miss_probes: Vec<Vec<u8>> = (0..QUERIES)
        .map(|_| {
            let mut k = keys[rng.gen_range(0..keys.len())].clone();
            let at = rng.gen_range(0..k.len());
            k[at] ^= 0x15;
            k
        })
        .collect();

    for (label, opts) in [
        ("complete", BuildOpts::complete()),
        ("filter", BuildOpts::filter()),
    ] {
        let start = Instant::now();
        let trie = PackTrie::from_sorted(&keys, &values, &opts, U64Codec)
            .expect("sorted unique input");
        let build = start.elapsed();

        let envelope = trie.to_bytes();
        let index_bits = (envelope.len() as f64 * 8.0
            - values.len() as f64 * 64.0)
            / keys.len() as f64;
        println!(
            "\nmode={label}: build {:.0} ms, {} nodes ({} big, {} short), {:.1} index bits/key",
            build.as_secs_f64() * 1e3,
            trie.counts().nodes,
            trie.counts().big_inners,
            trie.counts().short_inners,
            index_bits,
        );

        bench("get (hit)", QUERIES, || {
            let mut acc = 0u64;
            for probe in &hit_probes {
                if let Some(v) = trie.get(black_box(probe)) {
                    acc = acc.wrapping_add(v);
                }
            }
            acc
        });

        bench("get (miss)", QUERIES, || {
            let mut acc = 0u64;
            for probe in &miss_probes {
                if trie.get(black_box(probe)).is_some() {
                    acc += 1;
                }
            }
            acc
        });

        bench("range_get", QUERIES, || {
            let mut acc = 0u64;
            for probe in &miss_probes {
                if let Some(v) = trie.range_get(black_box(probe)) {
                    acc = acc.wrapping_add(v);
                }
            }
            acc
        });

        bench("search", QUERIES, || {
            let mut acc = 0u64;
            for probe in &hit_probes {
                let near = trie.search(black_box(probe));
                acc = acc
                    .wrapping_add(near.l.unwrap_or(0))
                    .wrapping_add(near.eq.unwrap_or(0))
                    .wrapping_add(near.r.unwrap_or(0));
            }
            acc
        });
    }
}
