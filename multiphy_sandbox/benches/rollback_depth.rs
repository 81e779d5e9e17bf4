//! Cost of a remote correction as a function of how far prediction ran ahead.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use multiphy_rollback::ControlState;
use multiphy_sandbox::{SandboxConfig, SandboxCoordinator, sandbox_handle};

fn predicted_ahead(depth: u64) -> SandboxCoordinator {
    let handle = sandbox_handle(SandboxConfig::default()).expect("default sandbox config");
    let mut coordinator = SandboxCoordinator::new(handle).expect("fresh sandbox snapshots");
    let input = ControlState::new().with("p0.speed", 1.0);
    for _ in 0..depth {
        coordinator.step_local(&input);
    }
    coordinator
}

fn rollback_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("remote_diff");

    for depth in [1u64, 8, 30, 120] {
        group.bench_with_input(BenchmarkId::new("rollback", depth), &depth, |b, &depth| {
            b.iter_batched(
                || predicted_ahead(depth),
                |mut coordinator| {
                    let diff = ControlState::new().with("p1.speed", -1.0);
                    black_box(coordinator.got_remote_diff(0, Some(diff)).expect("diff at frame 0"));
                    coordinator
                },
                criterion::BatchSize::LargeInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("heartbeat", depth), &depth, |b, &depth| {
            b.iter_batched(
                || predicted_ahead(depth),
                |mut coordinator| {
                    black_box(coordinator.got_remote_diff(depth, None).expect("heartbeat"));
                    coordinator
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn snapshot_benchmarks(c: &mut Criterion) {
    let handle = sandbox_handle(SandboxConfig::default()).expect("default sandbox config");
    c.bench_function("snapshot_round_trip", |b| {
        b.iter(|| black_box(handle.try_clone().expect("sandbox snapshot")));
    });
}

criterion_group!(benches, rollback_benchmarks, snapshot_benchmarks);
criterion_main!(benches);
