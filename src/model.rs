use super::errors::JobError;
use std::time::Duration;


/// Единица работы: идентификатор и непрозрачный payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: u64,
    pub payload: String,
}

impl Job {
    pub fn new(id: u64, payload: impl Into<String>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}


/// Результат обработки одной задачи. `job_id` совпадает с `Job::id`.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: u64,
    pub outcome: Result<String, JobError>,
    pub elapsed: Duration,
}

impl JobResult {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn output(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }

    pub fn error(&self) -> Option<&JobError> {
        self.outcome.as_ref().err()
    }
}


#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    pub submitted: usize,
    pub rejected: usize,
    pub completed: usize,
    pub failed: usize,
    pub queued: usize,
    pub active_workers: usize,
}

impl PoolMetrics {
    /// Сколько задач еще не дали результата (в очереди или в работе)
    pub fn pending(&self) -> usize {
        self.submitted.saturating_sub(self.completed + self.failed)
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed + self.failed;
        if total == 0 {
            return 1.0;
        }
        self.completed as f64 / total as f64
    }
}
