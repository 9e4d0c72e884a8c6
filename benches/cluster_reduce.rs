use criterion::{black_box, criterion_group, criterion_main, Criterion};
use voxstat::cluster::LabelValuesMap;
use voxstat::parallel::{pieces_hint, reduce_ranges};

fn bench_reduce_vs_serial(c: &mut Criterion) {
    let n = 200_000;
    let labels: Vec<i64> = (0..n).map(|i| ((i * 2654435761usize) % 64) as i64).collect();
    let positions: Vec<[f64; 3]> = (0..n)
        .map(|i| {
            let t = i as f64 * 0.001;
            [t.sin(), t.cos(), t]
        })
        .collect();

    c.bench_function("serial fold", |ben| {
        ben.iter(|| {
            let mut map = LabelValuesMap::new();
            for (l, p) in black_box(&labels).iter().zip(black_box(&positions)) {
                map.fold_point(*l, *p);
            }
            map
        })
    });

    c.bench_function("range reduce", |ben| {
        ben.iter(|| {
            reduce_ranges(
                n,
                pieces_hint(),
                |range| {
                    let mut map = LabelValuesMap::new();
                    for i in range {
                        map.fold_point(labels[i], positions[i]);
                    }
                    map
                },
                |a, b| a.merge(b),
            )
        })
    });
}

criterion_group!(benches, bench_reduce_vs_serial);
criterion_main!(benches);
