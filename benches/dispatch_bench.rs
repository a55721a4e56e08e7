//! Benchmarks for per-sample vs per-buffer dispatch.
//!
//! Run with: cargo bench
//!
//! Both groups render the same arrangement and apply the same frame
//! operation; only the dispatch granularity differs.
//!
//! Reference timing at 44.1kHz sample rate:
//!   - 256 samples  = 5.80ms deadline
//!   - 512 samples  = 11.61ms deadline
//!   - 1024 samples = 23.22ms deadline

use std::hint::black_box;
use std::rc::Rc;

use batchsynth::{
    AudioRunner, BlockCompiler, ChannelInfo, CompiledRunner, EngineConfig, FrameExpr,
    FrameOperation, MeasureClock, NoteArrangement, NullSink, RealTimeRunner, SceneContext,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

/// Buffer sizes to compare.
const BLOCK_SIZES: &[usize] = &[256, 512, 1024];

fn setup(buffer_size: usize) -> (EngineConfig, Rc<SceneContext>, NoteArrangement) {
    let config = EngineConfig::default().with_buffer_size(buffer_size);
    let clock = MeasureClock::new(120.0, 4.0, config.sample_rate as f64);
    let scene = Rc::new(SceneContext::new(8, clock));
    let arrangement = NoteArrangement::generate(42, 8, 1, config.sample_rate as f64);
    (config, scene, arrangement)
}

fn operation() -> FrameOperation {
    FrameOperation::fusable((FrameExpr::input() * FrameExpr::constant(1.5)).tanh())
}

fn bench_per_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/per_sample");

    for &size in BLOCK_SIZES {
        let (config, scene, arrangement) = setup(size);
        let mut runner = RealTimeRunner::new(
            &config,
            scene,
            arrangement,
            ChannelInfo::left(0),
            operation(),
            Box::new(NullSink),
        )
        .unwrap();
        runner.setup();

        group.bench_with_input(BenchmarkId::new("buffer", size), &size, |b, &size| {
            b.iter(|| {
                for _ in 0..size {
                    black_box(runner.tick()).unwrap();
                }
            })
        });
    }

    group.finish();
}

fn bench_compiled(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch/compiled");
    let compiler = BlockCompiler::default();

    for &size in BLOCK_SIZES {
        let (config, scene, arrangement) = setup(size);
        let mut runner = CompiledRunner::new(
            &config,
            scene,
            arrangement,
            ChannelInfo::left(0),
            operation(),
            Some(&compiler),
            Box::new(NullSink),
        )
        .unwrap();
        runner.setup();

        group.bench_with_input(BenchmarkId::new("buffer", size), &size, |b, _| {
            b.iter(|| black_box(runner.tick()).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_per_sample, bench_compiled);
criterion_main!(benches);
