//! Benchmarks for the heat index chain, zonal reduction and urban growth

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use thermogis_algorithms::imagery::{land_surface_temperature, median_composite, ndvi};
use thermogis_algorithms::simulation::{urban_state_from_ndvi, CaParams, CellularAutomaton};
use thermogis_algorithms::statistics::{zonal_statistic, Reducer};
use thermogis_core::{GeoTransform, Raster, RasterImage, Region};

fn create_band(size: usize, base: f64, step: f64) -> Raster<f64> {
    let data = (0..size * size)
        .map(|i| {
            let (row, col) = (i / size, i % size);
            base + ((row * 7 + col * 13) % 200) as f64 * step
        })
        .collect();
    let mut r = Raster::from_vec(data, size, size).unwrap();
    r.set_transform(GeoTransform::new(0.0, size as f64 * 30.0, 30.0, -30.0));
    r.set_nodata(Some(f64::NAN));
    r
}

fn bench_ndvi(c: &mut Criterion) {
    let mut group = c.benchmark_group("imagery/ndvi");
    for size in [256, 512, 1024, 2048] {
        let nir = create_band(size, 0.3, 0.001);
        let red = create_band(size, 0.05, 0.0005);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| ndvi(black_box(&nir), black_box(&red)).unwrap())
        });
    }
    group.finish();
}

fn bench_lst(c: &mut Criterion) {
    let mut group = c.benchmark_group("imagery/lst");
    for size in [256, 1024] {
        let tb = create_band(size, 290.0, 0.1);
        let em = create_band(size, 0.986, 0.00002);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| land_surface_temperature(black_box(&tb), black_box(&em)).unwrap())
        });
    }
    group.finish();
}

fn bench_median_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("imagery/median_composite");
    for scenes in [3, 9] {
        let images: Vec<RasterImage> = (0..scenes)
            .map(|i| {
                RasterImage::from_bands([("ST_B10", create_band(512, 290.0 + i as f64, 0.1))])
                    .unwrap()
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(scenes), &scenes, |b, _| {
            b.iter(|| median_composite(black_box(&images)).unwrap())
        });
    }
    group.finish();
}

fn bench_zonal_mean(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics/zonal_mean");
    for size in [512, 2048] {
        let band = create_band(size, 20.0, 0.1);
        let edge = size as f64 * 30.0;
        let region = Region::new(
            "aoi",
            &[(0.0, 0.0), (edge, 0.0), (edge * 0.5, edge), (0.0, edge * 0.8)],
        )
        .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                zonal_statistic(black_box(&band), "LST", &region, 30.0, Reducer::Mean).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_cellular_automaton(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation/cellular_automaton");
    group.sample_size(20);
    for size in [256, 512] {
        let ndvi = create_band(size, 0.0, 0.004);
        let state = urban_state_from_ndvi(&ndvi, 0.3).unwrap();
        let ca = CellularAutomaton::new(CaParams::default());
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| ca.run(black_box(&state)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_ndvi,
    bench_lst,
    bench_median_composite,
    bench_zonal_mean,
    bench_cellular_automaton
);
criterion_main!(benches);
