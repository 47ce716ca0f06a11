//! Criterion benchmarks for the TNV solver.
//!
//! Run with: cargo bench -p tnv_core
//! Run specific: cargo bench -p tnv_core -- solve_fixed_iterations

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array3;
use rand::prelude::*;

use tnv_core::{tnv_energy, SingularValueNorm, TnvConfig, TnvSolver};

// =============================================================================
// Helper Functions for Test Data Generation
// =============================================================================

fn random_volume_f32(rows: usize, cols: usize, channels: usize, seed: u64) -> Array3<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array3::from_shape_fn((rows, cols, channels), |_| rng.gen())
}

fn random_volume_f64(rows: usize, cols: usize, channels: usize, seed: u64) -> Array3<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array3::from_shape_fn((rows, cols, channels), |_| rng.gen())
}

fn fixed_iterations<F: tnv_core::TnvFloat>(threads: usize, norm: SingularValueNorm) -> TnvConfig<F> {
    TnvConfig {
        max_iter: 20,
        tol: F::zero(),
        num_threads: Some(threads),
        norm,
        ..TnvConfig::default()
    }
}

// =============================================================================
// Solver Benchmarks
// =============================================================================

fn bench_solve_fixed_iterations(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve_fixed_iterations");

    for size in [64, 128, 256] {
        let input = random_volume_f32(size, size, 3, 42);
        group.throughput(Throughput::Elements((size * size * 3 * 20) as u64));

        for threads in [1, 4] {
            let mut solver = TnvSolver::new(fixed_iterations(threads, SingularValueNorm::L1))
                .expect("valid config");
            let mut solution = input.clone();
            let id = BenchmarkId::new(format!("{threads}_threads"), size);
            group.bench_with_input(id, &size, |b, _| {
                b.iter(|| {
                    solution.assign(&input);
                    solver
                        .solve(black_box(input.view()), solution.view_mut())
                        .expect("solve")
                })
            });
        }
    }

    group.finish();
}

fn bench_norm_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("norm_comparison");
    let input = random_volume_f32(128, 128, 3, 7);

    for (name, norm) in [("l1", SingularValueNorm::L1), ("linf", SingularValueNorm::LInf)] {
        let mut solver = TnvSolver::new(fixed_iterations(4, norm)).expect("valid config");
        let mut solution = input.clone();
        group.bench_function(name, |b| {
            b.iter(|| {
                solution.assign(&input);
                solver
                    .solve(black_box(input.view()), solution.view_mut())
                    .expect("solve")
            })
        });
    }

    group.finish();
}

fn bench_precision_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("precision_comparison");
    let input_f32 = random_volume_f32(128, 128, 3, 11);
    let input_f64 = random_volume_f64(128, 128, 3, 11);

    let mut solver_f32 = TnvSolver::new(fixed_iterations::<f32>(4, SingularValueNorm::L1))
        .expect("valid config");
    let mut solution_f32 = input_f32.clone();
    group.bench_function("f32", |b| {
        b.iter(|| {
            solution_f32.assign(&input_f32);
            solver_f32
                .solve(black_box(input_f32.view()), solution_f32.view_mut())
                .expect("solve")
        })
    });

    let mut solver_f64 = TnvSolver::new(fixed_iterations::<f64>(4, SingularValueNorm::L1))
        .expect("valid config");
    let mut solution_f64 = input_f64.clone();
    group.bench_function("f64", |b| {
        b.iter(|| {
            solution_f64.assign(&input_f64);
            solver_f64
                .solve(black_box(input_f64.view()), solution_f64.view_mut())
                .expect("solve")
        })
    });

    group.finish();
}

fn bench_tnv_energy(c: &mut Criterion) {
    let mut group = c.benchmark_group("tnv_energy");

    for size in [64, 256] {
        let input = random_volume_f64(size, size, 3, 3);
        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| tnv_energy(black_box(input.view())))
        });
    }

    group.finish();
}

// =============================================================================
// Criterion Configuration
// =============================================================================

criterion_group!(
    benches,
    bench_solve_fixed_iterations,
    bench_norm_comparison,
    bench_precision_comparison,
    bench_tnv_energy,
);

criterion_main!(benches);
