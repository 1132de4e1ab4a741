//! Пул воркеров и fan-out/fan-in конвейер на tokio
//!
//! # Features
//! - Ограниченные очереди задач и результатов
//! - Кооперативная отмена через общий `CancellationToken`
//! - Пакетная обработка с возвратом частичных результатов при отмене
//! - Композиция стадий: генератор, map, filter, fan-out, fan-in
//! - Вариант с ограничением скорости по тикеру
//! - Метрики и периодический мониторинг

pub mod batch;
pub mod channel;
pub mod errors;
pub mod model;
pub mod pipeline;
pub mod pool;
pub mod processor;
pub mod rate_limit;
pub mod results;
pub mod scope;

pub use batch::BatchProcessor;
pub use errors::{BatchError, JobError, PoolError};
pub use model::{Job, JobResult, PoolMetrics};
pub use pipeline::{Pipeline, PipelineConfig, Stage};
pub use pool::{PoolConfig, Submitter, WorkerPool};
pub use processor::{processor_fn, Processor, SimulatedWork};
pub use rate_limit::RateLimitedProcessor;
pub use results::Results;
