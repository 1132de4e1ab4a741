use super::{
    channel::{self, Receiver, Sender},
    errors::{JobError, PoolError},
    model::{Job, JobResult, PoolMetrics},
    processor::Processor,
    results::Results,
};
use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use futures::FutureExt;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};


/// Конфигурация пула воркеров
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    /// Емкость и очереди задач, и буфера результатов
    pub buffer_size: usize,
    /// Если задано, пул сам пишет метрики в debug-лог с этим периодом
    pub monitor_interval: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            workers: num_cpus,
            buffer_size: num_cpus * 2,
            monitor_interval: None,
        }
    }
}

impl PoolConfig {
    pub fn new(workers: usize, buffer_size: usize) -> Self {
        Self {
            workers,
            buffer_size,
            monitor_interval: None,
        }
    }

    pub fn cpu_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            workers: num_cpus,
            buffer_size: num_cpus * 10,
            monitor_interval: None,
        }
    }

    pub fn io_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            workers: num_cpus * 2,
            buffer_size: num_cpus * 20,
            monitor_interval: None,
        }
    }

    /// Читает `WORKPOOL_WORKERS`, `WORKPOOL_BUFFER_SIZE`, `WORKPOOL_MONITOR_INTERVAL_MS`.
    /// Отсутствующие переменные берутся из `Default`.
    pub fn from_env() -> Result<Self, PoolError> {
        let mut config = Self::default();

        if let Some(workers) = env_usize("WORKPOOL_WORKERS")? {
            config.workers = workers;
        }
        if let Some(buffer_size) = env_usize("WORKPOOL_BUFFER_SIZE")? {
            config.buffer_size = buffer_size;
        }
        if let Some(ms) = env_usize("WORKPOOL_MONITOR_INTERVAL_MS")? {
            config.monitor_interval = Some(Duration::from_millis(ms as u64));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = Some(interval);
        self
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.workers == 0 {
            return Err(PoolError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.buffer_size == 0 {
            return Err(PoolError::InvalidConfig("buffer_size must be at least 1".into()));
        }
        if matches!(self.monitor_interval, Some(i) if i.is_zero()) {
            return Err(PoolError::InvalidConfig("monitor_interval must be non-zero".into()));
        }
        Ok(())
    }
}

fn env_usize(key: &str) -> Result<Option<usize>, PoolError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| PoolError::InvalidConfig(format!("{key}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}


#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicUsize,
    rejected: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    active_workers: AtomicUsize,
}

impl Counters {
    fn snapshot(&self, jobs: &Receiver<Job>) -> PoolMetrics {
        PoolMetrics {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            queued: jobs.len(),
            active_workers: self.active_workers.load(Ordering::Relaxed),
        }
    }
}


/// Пул из фиксированного числа воркеров над двумя ограниченными буферами.
///
/// Жизненный цикл: `new` -> `start` -> `submit`... -> `close`, результаты читаются
/// из `results()`. Поток результатов закрывается, когда вышел последний воркер.
pub struct WorkerPool<P: Processor> {
    config: PoolConfig,
    processor: Arc<P>,
    jobs_tx: Option<Sender<Job>>,
    jobs_rx: Receiver<Job>,
    results_tx: Option<mpsc::Sender<JobResult>>,
    results_rx: Option<mpsc::Receiver<JobResult>>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
    monitor: Option<CancellationToken>,
}

impl<P: Processor> WorkerPool<P> {
    pub fn new(config: PoolConfig, processor: P) -> Result<Self, PoolError> {
        Self::with_shared(config, Arc::new(processor))
    }

    pub fn with_shared(config: PoolConfig, processor: Arc<P>) -> Result<Self, PoolError> {
        config.validate()?;

        let (jobs_tx, jobs_rx) = channel::bounded(config.buffer_size);
        let (results_tx, results_rx) = mpsc::channel(config.buffer_size);

        Ok(Self {
            config,
            processor,
            jobs_tx: Some(jobs_tx),
            jobs_rx,
            results_tx: Some(results_tx),
            results_rx: Some(results_rx),
            workers: Vec::new(),
            counters: Arc::new(Counters::default()),
            monitor: None,
        })
    }

    /// Запускает воркеров в рамках `token`. Повторный вызов вернет `AlreadyStarted`.
    pub fn start(&mut self, token: &CancellationToken) -> Result<(), PoolError> {
        let results_tx = self.results_tx.take().ok_or(PoolError::AlreadyStarted)?;

        self.counters
            .active_workers
            .fetch_add(self.config.workers, Ordering::Release);

        for id in 0..self.config.workers {
            let worker = PoolWorker {
                id,
                jobs: self.jobs_rx.clone(),
                results: results_tx.clone(),
                processor: self.processor.clone(),
                counters: self.counters.clone(),
                token: token.clone(),
            };
            self.workers.push(tokio::spawn(worker.run()));
        }
        // results_tx остается только у воркеров

        if let Some(interval) = self.config.monitor_interval {
            let monitor = self.start_monitoring(interval, |m| {
                debug!(
                    submitted = m.submitted,
                    completed = m.completed,
                    failed = m.failed,
                    queued = m.queued,
                    active_workers = m.active_workers,
                    "pool metrics"
                );
            });
            let lifetime = token.clone();
            let stop = monitor.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = lifetime.cancelled() => stop.cancel(),
                    _ = stop.cancelled() => {}
                }
            });
            self.monitor = Some(monitor);
        }

        debug!(workers = self.config.workers, buffer = self.config.buffer_size, "worker pool started");
        Ok(())
    }

    /// Ставит задачу в очередь, ожидая места. `false`, если скоуп отменен или пул закрыт.
    pub async fn submit(&self, token: &CancellationToken, job: Job) -> bool {
        match &self.jobs_tx {
            Some(tx) => submit_job(tx, &self.counters, token, job).await,
            None => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Отдельный хендл для отправки из другой задачи
    pub fn submitter(&self) -> Result<Submitter, PoolError> {
        let tx = self.jobs_tx.as_ref().ok_or(PoolError::Closed)?;
        Ok(Submitter {
            tx: tx.clone(),
            counters: self.counters.clone(),
        })
    }

    /// Больше задач не будет. Очередь закроется, когда отпустят и все `Submitter`.
    pub fn close(&mut self) {
        if self.jobs_tx.take().is_some() {
            debug!("worker pool closed for submissions");
        }
    }

    /// Забирает единственный поток результатов
    pub fn results(&mut self) -> Result<Results, PoolError> {
        self.results_rx
            .take()
            .map(Results::new)
            .ok_or(PoolError::ResultsTaken)
    }

    /// Ждет выхода всех воркеров
    pub async fn join(&mut self) {
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task failed");
            }
        }
        if let Some(monitor) = self.monitor.take() {
            monitor.cancel();
        }
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        self.counters.snapshot(&self.jobs_rx)
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Периодически отдает снимок метрик в `callback`.
    /// ВАЖНО: вызовите `cancel()` у возвращенного токена, иначе задача мониторинга не завершится.
    pub fn start_monitoring<F>(&self, interval: Duration, callback: F) -> CancellationToken
    where
        F: Fn(PoolMetrics) + Send + 'static,
    {
        let counters = self.counters.clone();
        let jobs = self.jobs_rx.clone();
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => callback(counters.snapshot(&jobs)),
                    _ = token_clone.cancelled() => break,
                }
            }
        });

        token
    }
}

impl<P: Processor> Drop for WorkerPool<P> {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.cancel();
        }
    }
}


/// Клонируемый хендл отправки задач в пул
#[derive(Clone)]
pub struct Submitter {
    tx: Sender<Job>,
    counters: Arc<Counters>,
}

impl Submitter {
    pub async fn submit(&self, token: &CancellationToken, job: Job) -> bool {
        submit_job(&self.tx, &self.counters, token, job).await
    }
}

async fn submit_job(
    tx: &Sender<Job>,
    counters: &Counters,
    token: &CancellationToken,
    job: Job,
) -> bool {
    let job_id = job.id;
    let accepted = tokio::select! {
        biased;
        _ = token.cancelled() => false,
        sent = tx.send(job) => sent.is_ok(),
    };

    if accepted {
        counters.submitted.fetch_add(1, Ordering::Relaxed);
    } else {
        counters.rejected.fetch_add(1, Ordering::Relaxed);
        trace!(job_id, "job rejected");
    }
    accepted
}


struct PoolWorker<P> {
    id: usize,
    jobs: Receiver<Job>,
    results: mpsc::Sender<JobResult>,
    processor: Arc<P>,
    counters: Arc<Counters>,
    token: CancellationToken,
}

impl<P: Processor> PoolWorker<P> {
    async fn run(self) {
        debug!(worker_id = self.id, "worker started");

        loop {
            let job = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!(worker_id = self.id, "worker stopping, lifetime cancelled");
                    break;
                }
                job = self.jobs.recv() => match job {
                    Some(job) => job,
                    None => {
                        debug!(worker_id = self.id, "worker stopping, job queue closed");
                        break;
                    }
                },
            };

            // None: скоуп отменен во время обработки, результата не будет
            let Some(result) = self.process(job).await else {
                break;
            };
            let ok = result.is_ok();

            let published = tokio::select! {
                biased;
                _ = self.token.cancelled() => false,
                sent = self.results.send(result) => sent.is_ok(),
            };
            if !published {
                debug!(worker_id = self.id, "worker stopping, result not delivered");
                break;
            }

            if ok {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
            } else {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.counters.active_workers.fetch_sub(1, Ordering::Release);
    }

    async fn process(&self, job: Job) -> Option<JobResult> {
        let started = Instant::now();
        debug!(worker_id = self.id, job_id = job.id, "processing job");

        let work = AssertUnwindSafe(async { self.processor.process(&job).await }).catch_unwind();

        let outcome = tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                debug!(worker_id = self.id, job_id = job.id, "abandoning in-flight job");
                return None;
            }
            res = work => res.unwrap_or_else(|panic| Err(JobError::Panicked(panic_message(&*panic)))),
        };

        if let Err(e) = &outcome {
            debug!(worker_id = self.id, job_id = job.id, error = %e, "job failed");
        }

        Some(JobResult {
            job_id: job.id,
            outcome,
            elapsed: started.elapsed(),
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in processor".to_string()
    }
}
