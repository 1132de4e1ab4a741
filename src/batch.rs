use super::{
    errors::{BatchError, PoolError},
    model::{Job, JobResult},
    pool::{PoolConfig, WorkerPool},
    processor::Processor,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};


/// Одноразовая обработка фиксированного набора задач поверх `WorkerPool`.
/// На каждый вызов `process_batch` создается свежий пул.
pub struct BatchProcessor<P: Processor> {
    config: PoolConfig,
    processor: Arc<P>,
}

impl<P: Processor> BatchProcessor<P> {
    /// Буфер пула берется как `workers * 2`
    pub fn new(workers: usize, processor: P) -> Result<Self, PoolError> {
        Self::with_config(PoolConfig::new(workers, workers.saturating_mul(2)), processor)
    }

    pub fn with_config(config: PoolConfig, processor: P) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self {
            config,
            processor: Arc::new(processor),
        })
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Прогоняет все задачи и возвращает результаты в порядке завершения.
    /// При отмене скоупа возвращает `BatchError::Cancelled` с тем, что успели собрать.
    pub async fn process_batch(
        &self,
        token: &CancellationToken,
        jobs: Vec<Job>,
    ) -> Result<Vec<JobResult>, BatchError> {
        let total = jobs.len();
        let mut pool = WorkerPool::with_shared(self.config.clone(), self.processor.clone())?;
        pool.start(token)?;

        let results = pool.results()?;
        let submitter = pool.submitter()?;
        pool.close();

        let feeder_token = token.clone();
        let feeder = tokio::spawn(async move {
            for job in jobs {
                let job_id = job.id;
                if !submitter.submit(&feeder_token, job).await {
                    warn!(job_id, "failed to submit job, lifetime cancelled");
                    break;
                }
            }
            // submitter дропается здесь и закрывает очередь
        });

        let collected = results.collect_all().await;
        pool.join().await;
        if let Err(e) = feeder.await {
            warn!(error = %e, "batch feeder task failed");
        }

        if token.is_cancelled() {
            debug!(total, received = collected.len(), "batch cancelled");
            return Err(BatchError::Cancelled { partial: collected });
        }

        debug!(total, received = collected.len(), "batch completed");
        Ok(collected)
    }
}
