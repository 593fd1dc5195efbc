use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use rf_coverage_map::catalog::parse_catalog;
use rf_coverage_map::coverage::CoverageSample;
use rf_coverage_map::geo::{initial_bearing, LatLon};
use rf_coverage_map::render::{band_counts, world_position};

fn coverage_benchmark(c: &mut Criterion) {
    // A 50x50 sector, the size the backend returns at the default resolution.
    let site = LatLon { latitude: 54.9783, longitude: -1.6178 };
    let samples: Vec<CoverageSample> = (0..2500)
        .map(|i| CoverageSample {
            lat: site.latitude + (i / 50) as f64 * 0.001,
            lng: site.longitude + (i % 50) as f64 * 0.001,
            rsrp: -60.0 - (i % 80) as f64,
        })
        .collect();

    let mut csv = String::from("SiteID,Latitude,Longitude\n");
    for i in 0..5000 {
        csv.push_str(&format!("S{i:05},{},{}\n", 50.0 + i as f64 * 1e-3, -3.0 + i as f64 * 1e-3));
    }

    c.bench_function("initial_bearing", |b| {
        b.iter(|| {
            for s in &samples {
                black_box(initial_bearing(black_box(site), s.location()));
            }
        })
    });

    c.bench_function("band_counts", |b| b.iter(|| band_counts(black_box(&samples))));

    c.bench_function("project_samples", |b| {
        b.iter(|| {
            for s in &samples {
                black_box(world_position(s.location()));
            }
        })
    });

    c.bench_function("parse_catalog", |b| {
        b.iter(|| parse_catalog(black_box(csv.as_bytes())))
    });
}

criterion_group!(benches, coverage_benchmark);
criterion_main!(benches);
