#[cfg(test)]
mod tests {
    use async_workpool::{
        errors::JobError,
        model::Job,
        pipeline::{self, Pipeline, PipelineConfig},
        pool::{PoolConfig, WorkerPool},
        processor::{processor_fn, SimulatedWork},
        BatchProcessor,
    };
    use std::{
        collections::HashSet,
        future::Future,
        time::{Duration, Instant},
    };
    use tokio_util::sync::CancellationToken;

    async fn measure<F, Fut, T>(name: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let start = Instant::now();
        let result = f().await;
        let elapsed = start.elapsed();
        println!("✓ {}: {:?}", name, elapsed);
        result
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn load_test_1_small_fast_jobs() {
        println!("\n=== LOAD TEST 1: 10k быстрых задач ===");
        let token = CancellationToken::new();
        let mut pool = WorkerPool::new(
            PoolConfig::io_bound(),
            processor_fn(|job: Job| async move { Ok::<_, JobError>(job.payload) }),
        )
        .unwrap();
        pool.start(&token).unwrap();
        let results = pool.results().unwrap();

        let submitter = pool.submitter().unwrap();
        pool.close();
        let feeder_token = token.clone();
        tokio::spawn(async move {
            for i in 0..10_000 {
                submitter.submit(&feeder_token, Job::new(i, i.to_string())).await;
            }
        });

        let results = measure("10k jobs", || results.collect_all()).await;
        pool.join().await;

        assert_eq!(results.len(), 10_000);
        let ids: HashSet<u64> = results.iter().map(|r| r.job_id).collect();
        assert_eq!(ids.len(), 10_000);

        let metrics = pool.metrics();
        println!("  Успешно: {}/{}", metrics.completed, results.len());
        assert_eq!(metrics.completed, 10_000);
        assert_eq!(metrics.queued, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn load_test_2_batch_with_delay() {
        println!("\n=== LOAD TEST 2: батч из 2k задач по 1ms ===");
        let token = CancellationToken::new();
        let processor = BatchProcessor::with_config(
            PoolConfig::new(64, 128),
            SimulatedWork::new(Duration::from_millis(1)),
        )
        .unwrap();

        let jobs: Vec<_> = (0..2_000).map(|i| Job::new(i, format!("load-{i}"))).collect();
        let results = measure("2k jobs @ 1ms", || processor.process_batch(&token, jobs))
            .await
            .unwrap();

        let successful = results.iter().filter(|r| r.is_ok()).count();
        println!("  Успешно: {}/{}", successful, results.len());
        assert_eq!(successful, 2_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn load_test_3_wide_pipeline() {
        println!("\n=== LOAD TEST 3: 100k значений через 8 реплик ===");
        let token = CancellationToken::new();
        let flow = Pipeline::with_config(token, PipelineConfig::default().with_conduit_capacity(64));

        let sum = measure("100k pipeline", || async {
            let squares = flow.fan_out(flow.generate(0..100_000u64), 8, &pipeline::square::<u64>());
            let merged = flow.fan_in(squares);
            let mut sum = 0u64;
            let mut count = 0usize;
            while let Some(n) = merged.recv().await {
                sum += n;
                count += 1;
            }
            assert_eq!(count, 100_000);
            sum
        })
        .await;

        let expected: u64 = (0..100_000u64).map(|n| n * n).sum();
        assert_eq!(sum, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn load_test_4_many_submitters() {
        println!("\n=== LOAD TEST 4: 8 отправителей по 1k задач ===");
        let token = CancellationToken::new();
        let mut pool = WorkerPool::new(PoolConfig::new(16, 32), SimulatedWork::new(Duration::ZERO)).unwrap();
        pool.start(&token).unwrap();
        let results = pool.results().unwrap();

        for s in 0..8u64 {
            let submitter = pool.submitter().unwrap();
            let token = token.clone();
            tokio::spawn(async move {
                for i in 0..1_000u64 {
                    let id = s * 1_000 + i;
                    assert!(submitter.submit(&token, Job::new(id, "x")).await);
                }
            });
        }
        pool.close();

        let results = measure("8k jobs, 8 submitters", || results.collect_all()).await;
        assert_eq!(results.len(), 8_000);
        let ids: HashSet<u64> = results.iter().map(|r| r.job_id).collect();
        assert_eq!(ids, (0..8_000).collect::<HashSet<_>>());
    }
}
