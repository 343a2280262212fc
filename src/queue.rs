//! Набор ограниченных очередей, через которые общаются поставщик задач,
//! воркеры и сборщики.
//!
//! Закрытие очереди в терминах crossbeam означает дроп последнего `Sender`:
//! получатели дочитывают буфер и видят `Disconnected`. Поэтому закрывает
//! очередь тот, кто последним в неё пишет, и порядок закрытия задаётся
//! порядком завершения потоков, а не отдельным вызовом.

use super::{
    errors::{SubmitError, TaskError},
    model::SessionCounters,
};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendError, Sender, TrySendError};
use std::{sync::atomic::Ordering, time::Duration};


pub(crate) struct Queue<V> {
    pub(crate) tx: Sender<V>,
    pub(crate) rx: Receiver<V>,
}

impl<V> Queue<V> {
    pub(crate) fn bounded(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity);
        Self { tx, rx }
    }
}

/// Очереди одного вызова пакетного режима, каждая ёмкостью в число входов.
pub(crate) struct BatchQueues<T, R, E> {
    pub(crate) tasks: Queue<T>,
    pub(crate) results: Queue<R>,
    pub(crate) errors: Queue<TaskError<T, E>>,
}

impl<T, R, E> BatchQueues<T, R, E> {
    pub(crate) fn with_capacity(count: usize) -> Self {
        Self {
            tasks: Queue::bounded(count),
            results: Queue::bounded(count),
            errors: Queue::bounded(count),
        }
    }
}

/// Очереди одной сессии потокового пула.
pub(crate) struct SessionQueues<T, R> {
    pub(crate) tasks: Queue<T>,
    pub(crate) output: Queue<R>,
    /// Ровно `workers` слотов: `force_stop` никогда не блокируется на отправке.
    pub(crate) quit: Queue<()>,
}

impl<T, R> SessionQueues<T, R> {
    pub(crate) fn new(capacity: usize, workers: usize) -> Self {
        Self {
            tasks: Queue::bounded(capacity),
            output: Queue::bounded(capacity),
            quit: Queue::bounded(workers),
        }
    }
}

/// Запись в закрытую очередь означает ошибку в порядке остановки потоков.
/// Такое не должно происходить никогда, поэтому это паника, а не ошибка.
#[inline]
pub(crate) fn deliver<V>(sender: &Sender<V>, value: V, queue: &'static str) {
    if sender.send(value).is_err() {
        panic!("{queue} queue was closed while a worker still had output to deliver");
    }
}


/// Доступ к очереди задач запущенной сессии.
///
/// Заимствует пул, поэтому не может пережить остановку и не может закрыть очередь.
pub struct TaskQueue<'a, T> {
    sender: &'a Sender<T>,
    counters: &'a SessionCounters,
}

impl<'a, T> TaskQueue<'a, T> {
    pub(crate) fn new(sender: &'a Sender<T>, counters: &'a SessionCounters) -> Self {
        Self { sender, counters }
    }

    /// Блокируется, пока в очереди нет места.
    pub fn push(&self, task: T) -> Result<(), SubmitError<T>> {
        self.sender
            .send(task)
            .map_err(|SendError(task)| SubmitError::Disconnected(task))?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn try_push(&self, task: T) -> Result<(), SubmitError<T>> {
        self.sender.try_send(task).map_err(|err| match err {
            TrySendError::Full(task) => SubmitError::Full(task),
            TrySendError::Disconnected(task) => SubmitError::Disconnected(task),
        })?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.sender.is_full()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.sender.capacity().unwrap_or_default()
    }
}


/// Доступ к очереди результатов запущенной сессии.
///
/// Результаты, забранные отсюда, не попадают в обработчик и не получают индекс.
pub struct OutputQueue<'a, R> {
    receiver: &'a Receiver<R>,
}

impl<'a, R> OutputQueue<'a, R> {
    pub(crate) fn new(receiver: &'a Receiver<R>) -> Self {
        Self { receiver }
    }

    /// Блокируется до появления результата.
    pub fn pop(&self) -> Option<R> {
        self.receiver.recv().ok()
    }

    pub fn try_pop(&self) -> Option<R> {
        self.receiver.try_recv().ok()
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Option<R> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
