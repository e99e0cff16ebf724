use std::fs;
use std::path::{Path, PathBuf};

use logslice::{run_extraction, Config, ConfigBuilder, Error};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tempfile::{tempdir, TempDir};

/// One line every `step` seconds from 2022-01-01 to 2022-01-03 inclusive,
/// with payloads of varying length.
fn generate(step: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for day in 1..=3 {
        for (i, sec) in (0..86_400).step_by(step).enumerate() {
            let (h, m, s) = (sec / 3600, sec / 60 % 60, sec % 60);
            let pad = "x".repeat(i % 23);
            data.extend_from_slice(
                format!("2022-01-0{day} {h:02}:{m:02}:{s:02} req={i} {pad}\n").as_bytes(),
            );
        }
    }
    data
}

fn write_log(data: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    fs::write(&path, data).expect("write log");
    (dir, path)
}

fn small_chunks(path: &Path) -> ConfigBuilder {
    Config::builder(path)
        .read_chunk_small(256)
        .read_chunk_large(4096)
        .read_chunk_align(256)
}

fn extract(config: &Config) -> (Vec<u8>, logslice::ExtractStats) {
    let mut out = Vec::new();
    let stats = run_extraction(config, &mut out).expect("extract");
    (out, stats)
}

/// Lines whose timestamp lies in `[start, end]`, compared as text.
fn expected(data: &[u8], start: Option<&str>, end: Option<&str>) -> Vec<u8> {
    let text = std::str::from_utf8(data).expect("utf8");
    let mut out = Vec::new();
    for line in text.split_inclusive('\n') {
        let ts = &line[..19];
        if start.map_or(true, |s| ts >= s) && end.map_or(true, |e| ts <= e) {
            out.extend_from_slice(line.as_bytes());
        }
    }
    out
}

#[test]
fn start_only_streams_to_end_of_file() {
    let data = generate(37);
    let (_dir, path) = write_log(&data);
    let config = small_chunks(&path)
        .start("2022-01-02 00:00:00")
        .build()
        .expect("config");
    let (out, stats) = extract(&config);

    assert!(out.starts_with(b"2022-01-02 00:00:00 "));
    assert_eq!(out, expected(&data, Some("2022-01-02 00:00:00"), None));
    assert_eq!(stats.bytes_written, out.len() as u64);
    assert_eq!(stats.start_offset, Some((data.len() - out.len()) as u64));
    assert!(stats.probes > 0);
}

#[test]
fn end_only_stops_before_end_of_file() {
    let data = generate(37);
    let (_dir, path) = write_log(&data);
    let config = small_chunks(&path)
        .end("2022-01-01 23:59:59")
        .build()
        .expect("config");
    let (out, stats) = extract(&config);

    assert_eq!(out, expected(&data, None, Some("2022-01-01 23:59:59")));
    assert!(out.ends_with(b"\n"));
    assert!(stats.cache_misses < (data.len() / 4096) as u64);
}

#[test]
fn start_after_last_line_is_not_found() {
    let data = generate(600);
    let (_dir, path) = write_log(&data);
    let config = small_chunks(&path)
        .start("2022-01-04 00:00:00")
        .build()
        .expect("config");
    let mut out = Vec::new();
    let err = run_extraction(&config, &mut out).expect_err("no start line");
    assert!(matches!(err, Error::StartNotFound));
    assert_eq!(err.to_string(), "can't find start-time line");
    assert!(out.is_empty());
}

#[test]
fn small_file_is_scanned_without_seeking() {
    let data = b"2022-01-01 00:00:00 a\n2022-01-02 00:00:00 b\n2022-01-03 00:00:00 c\n";
    let (_dir, path) = write_log(data);
    let config = Config::builder(&path)
        .start("2022-01-02 00:00:00")
        .build()
        .expect("config");
    let (out, stats) = extract(&config);
    assert_eq!(out, b"2022-01-02 00:00:00 b\n2022-01-03 00:00:00 c\n");
    assert_eq!(stats.probes, 0);
    assert_eq!(stats.start_offset, Some(22));
}

#[test]
fn output_matches_reference_for_many_ranges() {
    let data = generate(53);
    let (_dir, path) = write_log(&data);
    let ranges = [
        ("2021-12-31 00:00:00", "2022-01-01 00:10:00"),
        ("2022-01-01 06:00:00", "2022-01-01 06:00:00"),
        ("2022-01-01 23:59:00", "2022-01-02 00:01:00"),
        ("2022-01-02 13:37:13", "2022-01-03 02:00:00"),
        ("2022-01-03 23:00:00", "2022-01-05 00:00:00"),
    ];
    for (start, end) in ranges {
        let reference = expected(&data, Some(start), Some(end));
        for (small, large) in [(64, 64), (256, 4096), (4096, 1 << 20)] {
            let config = Config::builder(&path)
                .start(start)
                .end(end)
                .read_chunk_small(small)
                .read_chunk_large(large)
                .read_chunk_align(64)
                .build()
                .expect("config");
            let (out, _) = extract(&config);
            assert_eq!(out, reference, "range {start}..{end} chunks {small}/{large}");
        }
    }
}

#[test]
fn line_limit_and_filter() {
    let data = generate(37);
    let (_dir, path) = write_log(&data);

    let config = small_chunks(&path)
        .start("2022-01-02 00:00:00")
        .max_lines(3)
        .build()
        .expect("config");
    let (out, stats) = extract(&config);
    let reference = expected(&data, Some("2022-01-02 00:00:00"), None);
    let first_three: Vec<u8> = std::str::from_utf8(&reference)
        .expect("utf8")
        .split_inclusive('\n')
        .take(3)
        .flat_map(|line| line.bytes())
        .collect();
    assert_eq!(out, first_three);
    assert_eq!(stats.lines, 3);

    let config = small_chunks(&path)
        .end("2022-01-01 23:59:59")
        .filter(" req=100 ")
        .build()
        .expect("config");
    let (out, stats) = extract(&config);
    assert!(std::str::from_utf8(&out)
        .expect("utf8")
        .starts_with("2022-01-01 01:01:40 req=100 "));
    assert_eq!(stats.lines, 1);
}

#[test]
fn no_bounds_copies_the_file() {
    let data = generate(300);
    let (_dir, path) = write_log(&data);
    let config = small_chunks(&path).build().expect("config");
    let (out, stats) = extract(&config);
    assert_eq!(out, data);
    assert_eq!(stats.lines, 0);
}

#[test]
fn empty_file_without_bounds_writes_nothing() {
    let (_dir, path) = write_log(b"");
    let config = Config::builder(&path).build().expect("config");
    let (out, stats) = extract(&config);
    assert!(out.is_empty());
    assert_eq!(stats.bytes_written, 0);
}

#[test]
fn missing_file_reports_path() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("missing.log");
    let config = Config::builder(&path).build().expect("config");
    let mut out = Vec::new();
    let err = run_extraction(&config, &mut out).expect_err("missing file");
    assert!(matches!(err, Error::Open { .. }));
    assert!(err.to_string().contains("missing.log"));
}

/// Sorted lines with random payloads, some followed by continuation lines.
fn random_log(rng: &mut SmallRng) -> (Vec<u8>, u32) {
    let mut data = Vec::new();
    let mut sec = 0;
    for _ in 0..rng.random_range(1..60) {
        sec += rng.random_range(0..3);
        data.extend_from_slice(format!("2022-01-01 00:{:02}:{:02} ", sec / 60, sec % 60).as_bytes());
        data.extend(std::iter::repeat(b'x').take(rng.random_range(0..40)));
        data.push(b'\n');
        for _ in 0..rng.random_range(0..3) {
            data.extend_from_slice(b"  at frame ");
            data.extend(std::iter::repeat(b'y').take(rng.random_range(0..24)));
            data.push(b'\n');
        }
    }
    (data, sec)
}

/// Offset of the first timestamped line at or after `start`.
fn first_at_or_after(data: &[u8], start: &str) -> Option<usize> {
    let mut offset = 0;
    for line in data.split_inclusive(|b| *b == b'\n') {
        if line.starts_with(b"2022") && &line[..19] >= start.as_bytes() {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

#[test]
fn random_sorted_files_match_reference() {
    let mut rng = SmallRng::seed_from_u64(0x5eed_1095);
    for round in 0..600 {
        let (data, last) = random_log(&mut rng);
        let (_dir, path) = write_log(&data);
        let small = [16, 32, 64][round % 3];
        let sec = rng.random_range(0..=last + 1);
        let start = format!("2022-01-01 00:{:02}:{:02}", sec / 60, sec % 60);
        let config = Config::builder(&path)
            .start(start.as_str())
            .read_chunk_small(small)
            .read_chunk_large(small * 4)
            .read_chunk_align(16)
            .build()
            .expect("config");

        let mut out = Vec::new();
        let result = run_extraction(&config, &mut out);
        match first_at_or_after(&data, &start) {
            Some(offset) => {
                let stats = result.expect("start line exists");
                assert_eq!(out, &data[offset..], "round {round} start {start} small {small}");
                let chunks = (data.len() as f64 / small as f64).max(1.0);
                let bound = chunks.log2().ceil() as u64 + 4;
                assert!(
                    stats.probes <= bound,
                    "round {round}: {} probes over {} bytes",
                    stats.probes,
                    data.len()
                );
            }
            None => assert!(
                matches!(result, Err(Error::StartNotFound)),
                "round {round} start {start}"
            ),
        }
    }
}
