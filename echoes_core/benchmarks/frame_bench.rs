use echoes_core::{
    build_app_with_config, publish, run_for, set_insanity_level, GameEvent, InsanityConfig,
};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

fn bench_steady_blend(c: &mut Criterion) {
    let mut group = c.benchmark_group("steady_blend");

    for frames in [60u32, 600, 3600] {
        group.bench_with_input(BenchmarkId::new("frames", frames), &frames, |b, &frames| {
            b.iter_batched(
                || {
                    let mut app = build_app_with_config(InsanityConfig::builtin());
                    set_insanity_level(&mut app.world, 0.6);
                    app
                },
                |mut app| {
                    run_for(&mut app, 1.0 / 60.0, frames);
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_flashback_round_trip(c: &mut Criterion) {
    c.bench_function("flashback_round_trip", |b| {
        b.iter_batched(
            || build_app_with_config(InsanityConfig::builtin()),
            |mut app| {
                publish(&mut app.world, GameEvent::FlashbackStarted);
                run_for(&mut app, 1.0 / 60.0, 240);
                publish(&mut app.world, GameEvent::RemedyUsed);
                run_for(&mut app, 1.0 / 60.0, 240);
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(frame_benches, bench_steady_blend, bench_flashback_round_trip);
criterion_main!(frame_benches);
