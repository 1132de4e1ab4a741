//! Ограниченный MPMC-канал поверх `crossbeam::deque::Injector`.
//!
//! Свободное место и готовые элементы считаются двумя семафорами, поэтому
//! `send` и `recv` безопасно гонять в `tokio::select!` против токена отмены:
//! после единственной точки ожидания весь код синхронный.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};
use crossbeam::deque::{Injector, Steal};
use tokio::sync::Semaphore;


struct Shared<T> {
    buffer: Injector<T>,
    slots: Semaphore,
    items: Semaphore,
    senders: AtomicUsize,
    receivers: AtomicUsize,
    /// Отправители между захватом слота и `push`
    pushing: AtomicUsize,
    closed: AtomicBool,
    capacity: usize,
}

impl<T> Shared<T> {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            // Ждущие места отправители получают отказ сразу, буфер остается читаемым
            self.slots.close();
            // Лишний permit будит получателей; каждый, кто нашел буфер пустым, передает его дальше
            self.items.add_permits(1);
        }
    }
}

/// Создает канал на `capacity` элементов (минимум 1)
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
    let shared = Arc::new(Shared {
        buffer: Injector::new(),
        slots: Semaphore::new(capacity),
        items: Semaphore::new(0),
        senders: AtomicUsize::new(1),
        receivers: AtomicUsize::new(1),
        pushing: AtomicUsize::new(0),
        closed: AtomicBool::new(false),
        capacity,
    });

    (
        Sender { shared: shared.clone() },
        Receiver { shared },
    )
}


/// Значение не доставлено: канал закрыт или получателей не осталось
pub struct SendError<T>(pub T);

impl<T> SendError<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendError").finish_non_exhaustive()
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel closed")
    }
}

impl<T> std::error::Error for SendError<T> {}


pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Sender<T> {
    /// Ждет свободного места. Cancel-safe: брошенный future ничего не занимает.
    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(SendError(value));
        }

        match self.shared.slots.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(SendError(value)),
        }

        // close() мог проскочить между acquire и push: тогда получатель уже
        // вправе вернуть None, и элемент остался бы в буфере навсегда
        self.shared.pushing.fetch_add(1, Ordering::SeqCst);
        if self.shared.closed.load(Ordering::SeqCst) {
            self.shared.pushing.fetch_sub(1, Ordering::SeqCst);
            self.shared.slots.add_permits(1);
            return Err(SendError(value));
        }

        self.shared.buffer.push(value);
        self.shared.items.add_permits(1);
        self.shared.pushing.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    /// Закрывает канал для всех отправителей. Уже отправленное будет дочитано.
    pub fn close(&self) {
        self.shared.close();
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
            || self.shared.receivers.load(Ordering::Acquire) == 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shared.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.buffer.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::Relaxed);
        Self { shared: self.shared.clone() }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.close();
        }
    }
}


pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Receiver<T> {
    /// `None` только когда канал закрыт и буфер вычерпан
    pub async fn recv(&self) -> Option<T> {
        loop {
            match self.shared.items.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return None,
            }

            if let Some(value) = self.take() {
                return Some(value);
            }

            if self.shared.closed.load(Ordering::SeqCst) {
                // permit закрытия передается следующему получателю в любом случае
                self.shared.items.add_permits(1);

                if self.shared.pushing.load(Ordering::SeqCst) > 0 {
                    tokio::task::yield_now().await;
                    continue;
                }
                return self.take();
            }
        }
    }

    fn take(&self) -> Option<T> {
        loop {
            match self.shared.buffer.steal() {
                Steal::Success(value) => {
                    self.shared.slots.add_permits(1);
                    return Some(value);
                }
                Steal::Retry => std::hint::spin_loop(),
                Steal::Empty => return None,
            }
        }
    }

    /// Вычитывает канал до закрытия
    pub async fn collect_all(self) -> Vec<T> {
        let mut values = Vec::new();
        while let Some(value) = self.recv().await {
            values.push(value);
        }
        values
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shared.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.buffer.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.shared.receivers.fetch_add(1, Ordering::Relaxed);
        Self { shared: self.shared.clone() }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        if self.shared.receivers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.slots.close();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn drains_buffer_after_last_sender_dropped() {
        let (tx, rx) = bounded(4);
        for i in 0..4 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        let mut got = Vec::new();
        while let Some(v) = rx.recv().await {
            got.push(v);
        }
        assert_eq!(got, vec![0, 1, 2, 3]);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_waits_for_free_slot() {
        let (tx, rx) = bounded(1);
        tx.send(1).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.send(2)).await;
        assert!(blocked.is_err(), "второй send должен ждать места");
        assert_eq!(tx.len(), 1);

        assert_eq!(rx.recv().await, Some(1));
        tx.send(3).await.unwrap();
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn zero_capacity_is_clamped() {
        let (tx, rx) = bounded::<u8>(0);
        assert_eq!(tx.capacity(), 1);
        tx.send(7).await.unwrap();
        assert_eq!(rx.recv().await, Some(7));
    }

    #[tokio::test]
    async fn send_fails_without_receivers() {
        let (tx, rx) = bounded(1);
        tx.send("a").await.unwrap();

        let pending = tokio::spawn({
            let tx = tx.clone();
            async move { tx.send("b").await.map_err(SendError::into_inner) }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(rx);

        assert_eq!(pending.await.unwrap(), Err("b"));
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let (tx, rx) = bounded(2);
        tx.send(1).await.unwrap();
        tx.close();

        assert!(tx.send(2).await.is_err());
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn close_rejects_sender_waiting_for_slot() {
        let (tx, rx) = bounded(1);
        tx.send(1).await.unwrap();

        let waiting = tokio::spawn({
            let tx = tx.clone();
            async move { tx.send(2).await.map_err(SendError::into_inner) }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.close();

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
        assert_eq!(waiting.await.unwrap(), Err(2), "недоставленный элемент не считается отправленным");
        assert!(rx.is_empty(), "после конца потока в буфере ничего не осталось");
    }

    #[tokio::test]
    async fn competing_receivers_split_the_work() {
        let (tx, rx) = bounded(2);
        let mut readers = Vec::new();
        for _ in 0..3 {
            let rx = rx.clone();
            readers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(v) = rx.recv().await {
                    seen.push(v);
                }
                seen
            }));
        }
        drop(rx);

        for i in 0..100u32 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        let mut all = Vec::new();
        for r in readers {
            all.extend(r.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn dropped_recv_future_does_not_lose_items() {
        let (tx, rx) = bounded(2);

        let idle = tokio::time::timeout(Duration::from_millis(20), rx.recv()).await;
        assert!(idle.is_err());

        tx.send(5).await.unwrap();
        assert_eq!(rx.recv().await, Some(5));
    }
}
