use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use memsentinel::config::{AdvisorConfig, PatternConfig};
use memsentinel::monitoring::{MemoryUsage, PatternDetector, Snapshot};
use memsentinel::optimization::{AdvisorContext, AdvisorEngine};
use memsentinel::PressureLevel;
use std::collections::BTreeMap;

fn sawtooth_history(len: usize) -> Vec<Snapshot> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..len)
        .map(|i| {
            let total = 400.0 + (i % 12) as f64 * 15.0 + i as f64 * 0.2;
            let mut objects = BTreeMap::new();
            objects.insert("entities".to_string(), 1_000 + i as u64 * 3);
            objects.insert("assets".to_string(), 200 + (i % 12) as u64);
            Snapshot::new(
                start + Duration::seconds(i as i64),
                MemoryUsage::new(total, total * 0.75, total * 0.25),
            )
            .with_object_counts(objects)
            .with_frame_rate(60.0 - (i % 12) as f64)
            .with_collection_count(i as u64 / 4)
        })
        .collect()
}

/// A full detection pass over buffers of increasing size
pub fn detection_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_detection");

    for len in [60usize, 300, 1_000] {
        let history = sawtooth_history(len);
        let now = history[len - 1].timestamp;
        let config = PatternConfig {
            analysis_window: len,
            ..PatternConfig::default()
        };

        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("detect", len), &history, |b, history| {
            let mut detector = PatternDetector::new(config.clone());
            b.iter(|| detector.detect(black_box(history), now))
        });
    }

    group.finish();
}

pub fn advisor_benchmarks(c: &mut Criterion) {
    let ctx = AdvisorContext {
        current_mb: 1_800.0,
        managed_mb: 1_300.0,
        unmanaged_mb: 500.0,
        frame_rate: 35.0,
        pressure_level: PressureLevel::High,
        leak_confirmed: true,
        leak_growth_rate_mb_per_min: Some(12.0),
        cleanup_runs: 10,
        cleanup_success_rate: 0.4,
        history_growth_mb: 300.0,
        history_span_minutes: 5.0,
        ..AdvisorContext::default()
    };
    let now = Utc::now();

    c.bench_function("advisor_evaluate", |b| {
        let mut engine = AdvisorEngine::new(&AdvisorConfig::default());
        b.iter(|| engine.evaluate(black_box(&ctx), now).len())
    });
}

criterion_group!(benches, detection_benchmarks, advisor_benchmarks);
criterion_main!(benches);
