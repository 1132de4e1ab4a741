use super::{
    channel::Receiver,
    errors::PoolError,
    model::{Job, JobResult},
    processor::{Processor, SimulatedWork},
};
use tokio::{
    sync::mpsc,
    time::{Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;


/// Обработчик, который берет из очереди не больше одной задачи за тик.
/// Пропущенные тики не накапливаются.
pub struct RateLimitedProcessor<P: Processor> {
    interval: Duration,
    processor: P,
}

impl RateLimitedProcessor<SimulatedWork> {
    /// Без задержки на обработку, ответ `"rate-limited processed: <payload>"`
    pub fn immediate(rate_per_second: u32) -> Result<Self, PoolError> {
        Self::new(
            rate_per_second,
            SimulatedWork::new(Duration::ZERO).with_prefix("rate-limited processed"),
        )
    }
}

impl<P: Processor> RateLimitedProcessor<P> {
    pub fn new(rate_per_second: u32, processor: P) -> Result<Self, PoolError> {
        if rate_per_second == 0 {
            return Err(PoolError::InvalidConfig("rate_per_second must be at least 1".into()));
        }
        Ok(Self {
            interval: Duration::from_secs(1) / rate_per_second,
            processor,
        })
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Работает, пока не отменен скоуп, не закрылась очередь или не пропал читатель результатов
    pub async fn process(
        &self,
        token: &CancellationToken,
        jobs: Receiver<Job>,
        results: mpsc::Sender<JobResult>,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let job = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                job = jobs.recv() => match job {
                    Some(job) => job,
                    None => {
                        debug!("rate-limited processor stopping, job queue closed");
                        return;
                    }
                },
            };

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                outcome = self.processor.process(&job) => outcome,
            };
            let result = JobResult {
                job_id: job.id,
                outcome,
                elapsed: started.elapsed(),
            };

            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                sent = results.send(result) => if sent.is_err() {
                    return;
                },
            }
        }
    }
}
