use crate::model::JobResult;

/// Ошибка обработки одной задачи. Путешествует внутри `JobResult`, пул не останавливает.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("job failed: {0}")]
    Failed(String),

    #[error("job panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("worker pool is already started")]
    AlreadyStarted,

    #[error("worker pool is closed for submissions")]
    Closed,

    #[error("results stream was already taken")]
    ResultsTaken,
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Скоуп отменен до завершения батча; собранные результаты не теряются
    #[error("batch cancelled after {} results", .partial.len())]
    Cancelled { partial: Vec<JobResult> },

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl BatchError {
    pub fn partial(&self) -> &[JobResult] {
        match self {
            BatchError::Cancelled { partial } => partial,
            BatchError::Pool(_) => &[],
        }
    }

    pub fn into_partial(self) -> Vec<JobResult> {
        match self {
            BatchError::Cancelled { partial } => partial,
            BatchError::Pool(_) => Vec::new(),
        }
    }
}
