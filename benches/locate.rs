use std::fs;
use std::io;

use criterion::{black_box, BenchmarkId, Criterion};
use criterion::{criterion_group, criterion_main};
use tempfile::tempdir;

use logslice::{run_extraction, Config};

const DAYS: usize = 7;

fn generate(path: &std::path::Path) -> u64 {
    let mut data = Vec::new();
    for day in 1..=DAYS {
        for sec in (0..86_400).step_by(2) {
            let (h, m, s) = (sec / 3600, sec / 60 % 60, sec % 60);
            data.extend_from_slice(
                format!("2022-01-{day:02} {h:02}:{m:02}:{s:02} INFO handled request id={sec}\n")
                    .as_bytes(),
            );
        }
    }
    fs::write(path, &data).expect("write log");
    data.len() as u64
}

fn bench_locate(c: &mut Criterion) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bench.log");
    let size = generate(&path);

    let mut group = c.benchmark_group("locate");
    for &day in &[1_usize, 4, 7] {
        let start = format!("2022-01-{day:02} 12:00:00");
        let config = Config::builder(&path)
            .start(start.as_str())
            .max_lines(1)
            .build()
            .expect("config");
        group.bench_with_input(BenchmarkId::from_parameter(&start), &config, |b, config| {
            b.iter(|| {
                let stats = run_extraction(black_box(config), &mut io::sink()).expect("extract");
                assert!(stats.start_offset.unwrap_or(0) < size);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_locate);
criterion_main!(benches);
