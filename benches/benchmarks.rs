//! Benchmark suite for promptloom composition.
//!
//! This module provides performance benchmarks for:
//! - Full prompt composition over libraries of various sizes
//! - Sanitizing long fragment lists
//! - Loading a tiered prompt set from disk
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Save baseline for comparison
//! cargo bench -- --save-baseline main
//!
//! # Compare against baseline
//! cargo bench -- --baseline main
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use promptloom::library::{PromptSet, TierPath};
use promptloom::prompt::{PromptComposer, Sanitizer};
use promptloom::{CancelPairTable, FragmentLibrary, SanitizerConfig, SeedPolicy};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

/// Library JSON with `collections` collections of `fragments` fragments each.
///
/// Every third collection depends on the first one.
fn library_json(prefix: &str, collections: usize, fragments: usize) -> String {
    let mut doc = serde_json::Map::new();
    for c in 0..collections {
        let prompts: Vec<String> = (0..fragments)
            .map(|f| {
                if f % 4 == 0 {
                    format!("(fragment {} {}:1.{})", c, f, f % 10)
                } else {
                    format!("fragment {} {}", c, f)
                }
            })
            .collect();
        let mut entry = json!({
            "prompts": prompts,
            "use_min_prompts": 1,
            "use_max_prompts": fragments.min(4),
        });
        if c > 0 && c % 3 == 0 {
            entry["condition"] = json!({
                "depends_on": format!("{}0", prefix),
                "must_contain_any": ["fragment 0 1"],
            });
        }
        doc.insert(format!("{}{}", prefix, c), entry);
    }
    serde_json::Value::Object(doc).to_string()
}

fn cancel_table(collections: usize) -> CancelPairTable {
    (0..collections).fold(CancelPairTable::new(), |table, c| {
        table.with_pair(format!("fragment {} 0", c), [format!("fragment {} 2", c)])
    })
}

// ============================================================================
// Composition Benchmarks
// ============================================================================

fn bench_compose(c: &mut Criterion) {
    let mut group = c.benchmark_group("compose");

    for collections in [5, 20, 50] {
        let library = FragmentLibrary::from_json(&library_json("C", collections, 20)).unwrap();
        let pairs = cancel_table(collections);
        let policy = SeedPolicy::new(0..100, 0);
        let composer = PromptComposer::new(&library, &pairs, &policy);
        let mut rng = StdRng::seed_from_u64(42);

        group.throughput(Throughput::Elements(collections as u64));
        group.bench_with_input(
            BenchmarkId::new("collections", collections),
            &collections,
            |b, _| b.iter(|| black_box(composer.compose(&mut rng).unwrap())),
        );
    }

    group.finish();
}

fn bench_sanitize(c: &mut Criterion) {
    let mut group = c.benchmark_group("sanitize");
    let sanitizer = Sanitizer::new(SanitizerConfig::default());

    for count in [20, 100, 500] {
        let fragments: Vec<String> = (0..count)
            .map(|i| match i % 5 {
                0 => format!("(weighted fragment {}:1.{})", i, i % 9),
                1 => format!("unbalanced (fragment {}", i),
                2 => "duplicate".to_string(),
                _ => format!("fragment number {}", i),
            })
            .collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("fragments", count), &fragments, |b, f| {
            b.iter(|| black_box(sanitizer.sanitize(f.clone())))
        });
    }

    group.finish();
}

// ============================================================================
// Loading Benchmarks
// ============================================================================

fn bench_load_prompt_set(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("prompts");
    let tier_dir = root.join("anime/portrait/close_up");
    fs::create_dir_all(&tier_dir).unwrap();
    fs::write(root.join("negative.json"), library_json("Negative", 3, 30)).unwrap();
    fs::write(root.join("anime/positive_pose.json"), library_json("Pose", 1, 30)).unwrap();
    fs::write(
        root.join("anime/portrait/positive_base.json"),
        library_json("Base", 10, 30),
    )
    .unwrap();
    fs::write(tier_dir.join("positive_optional.json"), "{}").unwrap();
    fs::write(root.join("cancel_seeds.json"), r#"{"Seeds": [1, 2, 3]}"#).unwrap();

    let tier = TierPath::new("anime", "portrait", "close_up");
    c.bench_function("load_prompt_set", |b| {
        b.iter(|| black_box(PromptSet::load(&root, &tier, false).unwrap()))
    });
}

criterion_group!(composition_benches, bench_compose, bench_sanitize);

criterion_group!(loading_benches, bench_load_prompt_set);

criterion_main!(composition_benches, loading_benches);
