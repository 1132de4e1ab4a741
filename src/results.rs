use super::model::JobResult;
use std::{
    pin::Pin,
    task::{Context, Poll},
};
use futures::Stream;
use tokio::sync::mpsc;


/// Поток результатов пула в порядке завершения (не отправки).
/// Заканчивается, когда вышли все воркеры.
pub struct Results {
    receiver: mpsc::Receiver<JobResult>,
}

impl Results {
    pub(crate) fn new(receiver: mpsc::Receiver<JobResult>) -> Self {
        Self { receiver }
    }

    #[inline]
    pub async fn recv(&mut self) -> Option<JobResult> {
        self.receiver.recv().await
    }

    /// Вычитывает все результаты до закрытия потока
    pub async fn collect_all(mut self) -> Vec<JobResult> {
        let mut results = Vec::new();
        while let Some(result) = self.receiver.recv().await {
            results.push(result);
        }
        results
    }
}

impl Stream for Results {
    type Item = JobResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
