//! Benchmarks for connection insertion and cycle checks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use patchbay_core::graph::{ComponentId, GraphState, ParamKind, ParamOptions};

fn nodes(count: u64) -> GraphState {
    let mut state = GraphState::new();
    for raw in 0..count {
        let id = ComponentId::from(raw);
        state.register(id, "node").unwrap();
        state
            .add_param(id, "in", ParamOptions::new(), ParamKind::Input)
            .unwrap();
        state
            .add_param(id, "out", ParamOptions::new(), ParamKind::Output)
            .unwrap();
    }
    state
}

fn linear(count: u64) -> GraphState {
    let mut state = nodes(count);
    for raw in 1..count {
        state
            .add_connection((ComponentId::from(raw), "in"), (ComponentId::from(raw - 1), "out"))
            .unwrap();
    }
    state
}

fn bench_build_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_chain");
    for size in [10u64, 100, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| black_box(linear(size)));
        });
    }
    group.finish();
}

fn bench_cycle_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle_check");
    for size in [10u64, 100, 500] {
        let state = linear(size);
        let head = ComponentId::from(0);
        let tail = ComponentId::from(size - 1);
        group.bench_with_input(BenchmarkId::new("closing", size), &size, |b, _| {
            b.iter(|| black_box(state.would_create_cycle(head, tail)));
        });
        // Level short-circuit: the input already sits above the output.
        group.bench_with_input(BenchmarkId::new("forward", size), &size, |b, _| {
            b.iter(|| black_box(state.would_create_cycle(tail, head)));
        });
    }
    group.finish();
}

fn bench_fan_in(c: &mut Criterion) {
    c.bench_function("fan_in_100", |b| {
        b.iter(|| {
            let mut state = nodes(101);
            let sink = ComponentId::from(100);
            state.begin_batch();
            for raw in 0..100 {
                state
                    .add_connection((sink, "in"), (ComponentId::from(raw), "out"))
                    .unwrap();
            }
            state.end_batch();
            black_box(state.pending_count())
        });
    });
}

criterion_group!(benches, bench_build_chain, bench_cycle_check, bench_fan_in);
criterion_main!(benches);
