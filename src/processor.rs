use super::{
    errors::JobError,
    model::Job,
};
use std::future::Future;
use tokio::time::Duration;


/// То, что воркер делает с задачей. Ошибка становится данными в `JobResult`.
pub trait Processor: Send + Sync + 'static {
    fn process(&self, job: &Job) -> impl Future<Output = Result<String, JobError>> + Send;
}


/// Имитация работы: ждет `delay` и отвечает `"<prefix>: <payload>"`
#[derive(Debug, Clone)]
pub struct SimulatedWork {
    delay: Duration,
    prefix: &'static str,
}

impl Default for SimulatedWork {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
            prefix: "processed",
        }
    }
}

impl SimulatedWork {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: &'static str) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Processor for SimulatedWork {
    async fn process(&self, job: &Job) -> Result<String, JobError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(format!("{}: {}", self.prefix, job.payload))
    }
}


#[derive(Clone)]
pub struct FnProcessor<F> {
    f: F,
}

/// Оборачивает async-замыкание в `Processor`
pub fn processor_fn<F, Fut>(f: F) -> FnProcessor<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, JobError>> + Send + 'static,
{
    FnProcessor { f }
}

impl<F, Fut> Processor for FnProcessor<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, JobError>> + Send + 'static,
{
    fn process(&self, job: &Job) -> impl Future<Output = Result<String, JobError>> + Send {
        (self.f)(job.clone())
    }
}
