use anyhow::Result;
use async_workpool::{
    pipeline::{self, Pipeline},
    scope, BatchProcessor, Job, PoolConfig, RateLimitedProcessor, SimulatedWork, WorkerPool,
};
use tokio::{sync::mpsc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};


#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "async_workpool=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let root = CancellationToken::new();
    let token = scope::with_deadline(&root, Duration::from_secs(30));

    info!("=== Demo 1: Basic Worker Pool ===");
    demo_worker_pool(&token).await?;

    info!("=== Demo 2: Batch Processor ===");
    demo_batch_processor(&token).await?;

    info!("=== Demo 3: Fan-Out/Fan-In Pipeline ===");
    demo_pipeline(&token).await;

    info!("=== Demo 4: Rate Limited Processor ===");
    demo_rate_limited(&token).await?;

    root.cancel();
    info!("all demos completed");
    Ok(())
}

async fn demo_worker_pool(token: &CancellationToken) -> Result<()> {
    let mut pool = WorkerPool::new(PoolConfig::new(3, 10), SimulatedWork::default())?;
    pool.start(token)?;
    let mut results = pool.results()?;

    for i in 0..5 {
        pool.submit(token, Job::new(i, format!("task-{i}"))).await;
    }
    pool.close();

    while let Some(result) = results.recv().await {
        info!(
            job_id = result.job_id,
            output = result.output().unwrap_or_default(),
            elapsed = ?result.elapsed,
            "result received"
        );
    }
    pool.join().await;
    Ok(())
}

async fn demo_batch_processor(token: &CancellationToken) -> Result<()> {
    let processor = BatchProcessor::new(4, SimulatedWork::default())?;
    let jobs = (0..10)
        .map(|i| Job::new(i, format!("batch-task-{i}")))
        .collect();

    match processor.process_batch(token, jobs).await {
        Ok(results) => info!(total_results = results.len(), "batch completed"),
        Err(e) => error!(error = %e, partial = e.partial().len(), "batch processing failed"),
    }
    Ok(())
}

async fn demo_pipeline(token: &CancellationToken) {
    let flow = Pipeline::new(token.clone());

    let nums = flow.generate(1..=10i64);
    let squares = flow.fan_out(nums, 3, &pipeline::square::<i64>());
    let merged = flow.fan_in(squares);

    let mut sum = 0;
    while let Some(n) = merged.recv().await {
        sum += n;
        info!(value = n, "pipeline result");
    }
    info!(sum, "pipeline complete");
}

async fn demo_rate_limited(token: &CancellationToken) -> Result<()> {
    let limiter = RateLimitedProcessor::immediate(20)?;
    let (jobs_tx, jobs_rx) = async_workpool::channel::bounded(5);
    let (results_tx, mut results_rx) = mpsc::channel(5);

    let feeder = tokio::spawn(async move {
        for i in 0..5 {
            if jobs_tx.send(Job::new(i, format!("limited-{i}"))).await.is_err() {
                break;
            }
        }
    });

    let worker_token = token.clone();
    let worker = tokio::spawn(async move {
        limiter.process(&worker_token, jobs_rx, results_tx).await;
    });

    while let Some(result) = results_rx.recv().await {
        info!(
            job_id = result.job_id,
            output = result.output().unwrap_or_default(),
            "rate-limited result"
        );
    }

    feeder.await?;
    worker.await?;
    Ok(())
}
