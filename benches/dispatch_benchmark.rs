use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fleetrun::dispatcher::TaskDispatcher;
use fleetrun::executors::SessionExecutor;
use fleetrun::models::{Command, ConnectionConfig, Credential, Host, Task, TaskOutcome};
use fleetrun::state::TaskLifecycle;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

/// Executor that answers instantly, isolating dispatch overhead
struct InstantExecutor;

#[async_trait]
impl SessionExecutor for InstantExecutor {
    async fn execute(
        &self,
        task: &Task,
        _config: &Arc<ConnectionConfig>,
        _lifecycle: &TaskLifecycle,
    ) -> TaskOutcome {
        TaskOutcome::success(format!("{}\n", task.host))
    }
}

/// Executor that simulates network latency per session
struct LatencyExecutor(Duration);

#[async_trait]
impl SessionExecutor for LatencyExecutor {
    async fn execute(
        &self,
        _task: &Task,
        _config: &Arc<ConnectionConfig>,
        _lifecycle: &TaskLifecycle,
    ) -> TaskOutcome {
        tokio::time::sleep(self.0).await;
        TaskOutcome::success("ok\n")
    }
}

fn inputs(commands: usize, hosts: usize) -> (Vec<Command>, Vec<Host>) {
    let commands = (0..commands)
        .map(|i| Command::new(format!("echo {}", i)).unwrap())
        .collect();
    let hosts = (0..hosts)
        .map(|i| Host::new(format!("10.0.{}.{}", i / 256, i % 256)).unwrap())
        .collect();
    (commands, hosts)
}

fn config() -> Arc<ConnectionConfig> {
    Arc::new(ConnectionConfig::new(
        "bench",
        Credential::new("bench").unwrap(),
        Duration::from_secs(5),
    ))
}

/// Benchmark dispatch + collection overhead with a no-op executor
fn bench_dispatch_overhead(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("dispatch_overhead");

    for hosts in [10, 100, 1000] {
        let (commands, host_list) = inputs(5, hosts);
        group.throughput(Throughput::Elements((5 * hosts) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(hosts), &hosts, |b, _| {
            let dispatcher = TaskDispatcher::new(Arc::new(InstantExecutor), 16);
            b.iter(|| {
                rt.block_on(async {
                    let mut sink = std::io::sink();
                    let summary = dispatcher
                        .run(black_box(&commands), black_box(&host_list), config(), &mut sink)
                        .await
                        .unwrap();
                    assert!(summary.is_complete());
                })
            });
        });
    }

    group.finish();
}

/// Benchmark wall time against pool size with simulated session latency
fn bench_pool_size(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("pool_size");
    group.sample_size(10);

    let (commands, host_list) = inputs(1, 64);
    for pool in [1, 8, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(pool), &pool, |b, &pool| {
            let dispatcher =
                TaskDispatcher::new(Arc::new(LatencyExecutor(Duration::from_millis(2))), pool);
            b.iter(|| {
                rt.block_on(async {
                    let mut sink = std::io::sink();
                    dispatcher
                        .run(&commands, &host_list, config(), &mut sink)
                        .await
                        .unwrap()
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dispatch_overhead, bench_pool_size);
criterion_main!(benches);
