use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use memcore::{HashMap, StrHasher};
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        // Keep clear of the all-ones sentinel.
        Some(s >> 1)
    })
}

fn key(n: u64) -> String {
    format!("k{:016x}", n)
}

fn bench_insert_fresh_100k(c: &mut Criterion) {
    c.bench_function("hash_map::insert_fresh_100k", |b| {
        b.iter_batched(
            HashMap::<u64, u64>::new,
            |mut m| {
                for (i, x) in lcg(1).take(100_000).enumerate() {
                    m.insert(x, i as u64);
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_insert_presized_100k(c: &mut Criterion) {
    c.bench_function("hash_map::insert_presized_100k", |b| {
        b.iter_batched(
            || HashMap::<u64, u64>::with_capacity(1 << 18),
            |mut m| {
                for (i, x) in lcg(2).take(100_000).enumerate() {
                    m.insert(x, i as u64);
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_find_hit_miss(c: &mut Criterion) {
    let keys: Vec<u64> = lcg(3).take(100_000).collect();
    let m: HashMap<u64, u64> = keys.iter().map(|&k| (k, k)).collect();
    let misses: Vec<u64> = lcg(4).take(100_000).collect();

    c.bench_function("hash_map::find_hit_100k", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for k in &keys {
                sum = sum.wrapping_add(*m.find(k).unwrap_or(&0));
            }
            black_box(sum)
        })
    });
    c.bench_function("hash_map::find_miss_100k", |b| {
        b.iter(|| {
            let mut found = 0usize;
            for k in &misses {
                found += usize::from(m.contains_key(k));
            }
            black_box(found)
        })
    });
}

fn bench_remove_all_100k(c: &mut Criterion) {
    let keys: Vec<u64> = lcg(5).take(100_000).collect();
    c.bench_function("hash_map::remove_all_100k", |b| {
        b.iter_batched(
            || keys.iter().map(|&k| (k, k)).collect::<HashMap<u64, u64>>(),
            |mut m| {
                for k in &keys {
                    black_box(m.remove(k));
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_str_keys_10k(c: &mut Criterion) {
    let owned: Vec<String> = lcg(6).take(10_000).map(key).collect();
    c.bench_function("hash_map::str_insert_find_10k", |b| {
        b.iter(|| {
            let mut m: HashMap<&str, usize, StrHasher> = HashMap::new();
            for (i, s) in owned.iter().enumerate() {
                m.insert(s.as_str(), i);
            }
            let mut sum = 0usize;
            for s in &owned {
                sum += m.find(&s.as_str()).copied().unwrap_or(0);
            }
            black_box(sum)
        })
    });
}

fn config() -> Criterion {
    Criterion::default()
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(3))
        .sample_size(20)
}

criterion_group! {
    name = benches;
    config = config();
    targets = bench_insert_fresh_100k,
        bench_insert_presized_100k,
        bench_find_hit_miss,
        bench_remove_all_100k,
        bench_str_keys_10k
}
criterion_main!(benches);
