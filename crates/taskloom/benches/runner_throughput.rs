use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskloom::{monotonic_clock, ManualClock, PollingTaskRunner, TaskRunnerExt, ThreadPoolTaskRunner};

fn bench_polling_post_and_pump(c: &mut Criterion) {
    let mut group = c.benchmark_group("polling");

    for count in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("post_and_pump", count), &count, |b, &count| {
            let clock = ManualClock::default();
            let runner = PollingTaskRunner::new(clock.clock());
            let hits = Arc::new(AtomicUsize::new(0));
            b.iter(|| {
                for i in 0..count {
                    let hits = hits.clone();
                    runner.post_delayed_task(
                        move || {
                            hits.fetch_add(black_box(1), Ordering::Relaxed);
                        },
                        Duration::from_nanos((i % 7) as u64),
                    );
                }
                clock.advance(Duration::from_nanos(7));
                runner.run_pending_tasks();
            });
        });
    }

    group.finish();
}

fn bench_pool_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_pool");

    for threads in [1usize, 4, 8] {
        let pool = ThreadPoolTaskRunner::new(monotonic_clock(), threads, Duration::from_secs(10));
        group.bench_with_input(BenchmarkId::new("apply_task_sync", threads), &threads, |b, _| {
            b.iter(|| {
                pool.apply_task_sync(|i| {
                    black_box(i * i);
                }, 64);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_polling_post_and_pump, bench_pool_apply);
criterion_main!(benches);
