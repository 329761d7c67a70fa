use criterion::{black_box, criterion_group, criterion_main, Criterion};

use io_range::{accumulate, compress, sort, Length, Offset};

fn scattered_lists(count: usize) -> (Vec<Offset>, Vec<Length>) {
    // Alternating touching and gapped ranges, emitted out of order.
    let mut offsets = Vec::with_capacity(count);
    let mut lengths = Vec::with_capacity(count);
    let mut at = 0i64;
    for i in 0..count {
        offsets.push(Offset(at));
        lengths.push(Length(64));
        at += if i % 2 == 0 { 64 } else { 96 };
    }
    offsets.reverse();
    lengths.reverse();
    (offsets, lengths)
}

fn range_algebra_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_algebra");

    let (offsets, lengths) = scattered_lists(10_000);

    group.bench_function("sort_10k", |b| {
        b.iter(|| {
            let mut offsets = black_box(offsets.clone());
            let mut lengths = black_box(lengths.clone());
            sort(&mut offsets, &mut lengths);
        });
    });

    group.bench_function("sort_compress_10k", |b| {
        b.iter(|| {
            let mut offsets = black_box(offsets.clone());
            let mut lengths = black_box(lengths.clone());
            sort(&mut offsets, &mut lengths);
            compress(&mut offsets, &mut lengths);
        });
    });

    group.bench_function("accumulate_10k", |b| {
        b.iter(|| {
            let positions = accumulate(black_box(&lengths), Offset(0));
            black_box(positions);
        });
    });

    group.finish();
}

criterion_group!(benches, range_algebra_benchmark);
criterion_main!(benches);
