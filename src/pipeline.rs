//! Fan-out / fan-in конвейер поверх `channel`.
//!
//! Каждая стадия крутится в своей задаче и закрывает выход, когда вход
//! исчерпан или отменен скоуп. Реплики в `fan_out` делят один вход:
//! работа распределяется, а не дублируется.

use super::channel::{self, Receiver, Sender};
use std::{ops::Mul, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::trace;


#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Емкость каналов между стадиями. 1 ближе всего к рандеву.
    pub conduit_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { conduit_capacity: 1 }
    }
}

impl PipelineConfig {
    pub fn with_conduit_capacity(mut self, capacity: usize) -> Self {
        self.conduit_capacity = capacity;
        self
    }
}


/// Стадия: превращает входную последовательность в выходную
pub trait Stage<In, Out>: Send + Sync {
    fn run(&self, token: &CancellationToken, input: Receiver<In>) -> Receiver<Out>;
}


pub struct FnStage<F> {
    f: F,
}

/// Делает стадию из функции, которая сама запускает свою задачу
pub fn stage_fn<In, Out, F>(f: F) -> FnStage<F>
where
    F: Fn(&CancellationToken, Receiver<In>) -> Receiver<Out> + Send + Sync,
{
    FnStage { f }
}

impl<In, Out, F> Stage<In, Out> for FnStage<F>
where
    F: Fn(&CancellationToken, Receiver<In>) -> Receiver<Out> + Send + Sync,
{
    fn run(&self, token: &CancellationToken, input: Receiver<In>) -> Receiver<Out> {
        (self.f)(token, input)
    }
}


/// Применяет `f` к каждому элементу
pub struct Map<F> {
    f: Arc<F>,
    capacity: usize,
}

impl<F> Map<F> {
    pub fn new(f: F) -> Self {
        Self {
            f: Arc::new(f),
            capacity: PipelineConfig::default().conduit_capacity,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

impl<In, Out, F> Stage<In, Out> for Map<F>
where
    In: Send + 'static,
    Out: Send + 'static,
    F: Fn(In) -> Out + Send + Sync + 'static,
{
    fn run(&self, token: &CancellationToken, input: Receiver<In>) -> Receiver<Out> {
        let f = self.f.clone();
        spawn_stage(token, input, self.capacity, move |value| Some(f(value)))
    }
}


/// Пропускает только элементы, для которых `predicate` вернул `true`
pub struct Filter<F> {
    predicate: Arc<F>,
    capacity: usize,
}

impl<F> Filter<F> {
    pub fn new(predicate: F) -> Self {
        Self {
            predicate: Arc::new(predicate),
            capacity: PipelineConfig::default().conduit_capacity,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

impl<T, F> Stage<T, T> for Filter<F>
where
    T: Send + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn run(&self, token: &CancellationToken, input: Receiver<T>) -> Receiver<T> {
        let predicate = self.predicate.clone();
        spawn_stage(token, input, self.capacity, move |value| {
            predicate(&value).then_some(value)
        })
    }
}


/// Возводит в квадрат обычным `n * n`.
///
/// Для целых переполнение в debug-сборке паникует внутри задачи стадии: выход
/// закрывается раньше времени и снаружи неотличим от конца входа. Для широких
/// диапазонов берите `Map::new(|n: u64| n.wrapping_mul(n))` или `checked_mul`.
pub fn square<T>() -> Map<impl Fn(T) -> T + Send + Sync + 'static>
where
    T: Mul<Output = T> + Copy + Send + 'static,
{
    Map::new(|n: T| n * n)
}


fn spawn_stage<In, Out, F>(
    token: &CancellationToken,
    input: Receiver<In>,
    capacity: usize,
    step: F,
) -> Receiver<Out>
where
    In: Send + 'static,
    Out: Send + 'static,
    F: Fn(In) -> Option<Out> + Send + 'static,
{
    let (tx, rx) = channel::bounded(capacity);
    let token = token.clone();

    tokio::spawn(async move {
        loop {
            let value = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                value = input.recv() => match value {
                    Some(value) => value,
                    None => break,
                },
            };

            let Some(out) = step(value) else {
                continue;
            };

            if !forward(&token, &tx, out).await {
                break;
            }
        }
        // tx дропается здесь и закрывает выход
    });

    rx
}

/// `false`, если скоуп отменен или читать выход больше некому
async fn forward<T>(token: &CancellationToken, tx: &Sender<T>, value: T) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        sent = tx.send(value) => sent.is_ok(),
    }
}


/// Конвейер, привязанный к одному скоупу отмены
#[derive(Debug, Clone)]
pub struct Pipeline {
    token: CancellationToken,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(token: CancellationToken) -> Self {
        Self::with_config(token, PipelineConfig::default())
    }

    pub fn with_config(token: CancellationToken, config: PipelineConfig) -> Self {
        Self { token, config }
    }

    #[inline]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Источник конечной последовательности. Останавливается раньше при отмене.
    pub fn generate<T, I>(&self, values: I) -> Receiver<T>
    where
        T: Send + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        let (tx, rx) = channel::bounded(self.config.conduit_capacity);
        let token = self.token.clone();
        let values = values.into_iter();

        tokio::spawn(async move {
            for value in values {
                if !forward(&token, &tx, value).await {
                    trace!("generator stopped early");
                    break;
                }
            }
        });

        rx
    }

    /// Запускает `replicas` копий стадии над общим входом
    pub fn fan_out<In, Out, S>(
        &self,
        input: Receiver<In>,
        replicas: usize,
        stage: &S,
    ) -> Vec<Receiver<Out>>
    where
        S: Stage<In, Out> + ?Sized,
    {
        (0..replicas)
            .map(|_| stage.run(&self.token, input.clone()))
            .collect()
    }

    /// Сливает выходы в один. Он закрывается, когда иссякли все источники:
    /// каждый пересыльщик держит свой `Sender`, счетчик отправителей в канале
    /// и есть общий счетчик завершения.
    pub fn fan_in<T>(&self, inputs: Vec<Receiver<T>>) -> Receiver<T>
    where
        T: Send + 'static,
    {
        let (tx, rx) = channel::bounded(self.config.conduit_capacity);

        for input in inputs {
            let tx = tx.clone();
            let token = self.token.clone();
            tokio::spawn(async move {
                loop {
                    let value = tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        value = input.recv() => match value {
                            Some(value) => value,
                            None => break,
                        },
                    };
                    if !forward(&token, &tx, value).await {
                        break;
                    }
                }
            });
        }

        rx
    }
}


pub fn generate<T, I>(token: &CancellationToken, values: I) -> Receiver<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
{
    Pipeline::new(token.clone()).generate(values)
}

pub fn fan_out<In, Out, S>(
    token: &CancellationToken,
    input: Receiver<In>,
    replicas: usize,
    stage: &S,
) -> Vec<Receiver<Out>>
where
    S: Stage<In, Out> + ?Sized,
{
    Pipeline::new(token.clone()).fan_out(input, replicas, stage)
}

pub fn fan_in<T>(token: &CancellationToken, inputs: Vec<Receiver<T>>) -> Receiver<T>
where
    T: Send + 'static,
{
    Pipeline::new(token.clone()).fan_in(inputs)
}
