//! Мост в async: пакет в фоне как `Future`, результаты пула как `Stream`.

use super::{
    batch::{BatchReport, BatchRunner},
    errors::{PoolError, WaitError},
    worker::BatchWorker,
};
use futures::Stream;
use std::{
    any::Any,
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    task::{Context, Poll},
    thread,
};
use tokio::{
    sync::{mpsc, oneshot},
    time::Duration,
};


type BatchOutcome<T, R, E> = thread::Result<BatchReport<T, R, E>>;

/// Запускает пакет на отдельном потоке и сразу возвращает handle.
///
/// Сам пакет по-прежнему блокирующий, async-рантайм он не занимает.
pub fn spawn_batch<T, R, E, W>(
    runner: BatchRunner,
    inputs: Vec<T>,
    worker: W,
) -> Result<BatchHandle<T, R, E>, PoolError>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    W: BatchWorker<T, R, E> + Send + 'static,
{
    let (tx, rx) = oneshot::channel::<BatchOutcome<T, R, E>>();
    let builder = runner.config().thread_builder("batch", 0);
    let thread = builder.spawn(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| runner.execute(inputs, worker)));
        let _ = tx.send(outcome);
    })?;
    Ok(BatchHandle::new(rx, thread))
}


/// Handle на пакет, выполняющийся в фоне.
///
/// Поток пакета принадлежит handle: он присоединяется, когда future
/// завершилась, при [`BatchHandle::join`] или при drop. Drop блокируется до
/// конца пакета, отчёт при этом теряется.
pub struct BatchHandle<T, R, E> {
    receiver: oneshot::Receiver<BatchOutcome<T, R, E>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl<T, R, E> BatchHandle<T, R, E> {
    fn new(receiver: oneshot::Receiver<BatchOutcome<T, R, E>>, thread: thread::JoinHandle<()>) -> Self {
        Self { receiver, thread: Some(thread) }
    }

    /// После `WaitError::Timeout` пакет продолжает работать, handle можно ждать снова.
    pub async fn await_timeout(&mut self, timeout: Duration) -> Result<BatchReport<T, R, E>, WaitError> {
        match tokio::time::timeout(timeout, &mut *self).await {
            Ok(outcome) => outcome,
            Err(_) => Err(WaitError::Timeout),
        }
    }

    /// Блокирующее ожидание без рантайма.
    pub fn join(mut self) -> Result<BatchReport<T, R, E>, WaitError> {
        self.join_thread();
        match self.receiver.try_recv() {
            Ok(outcome) => into_report(outcome),
            Err(_) => Err(WaitError::Abandoned),
        }
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, thread::JoinHandle::is_finished)
    }

    // Поток ловит панику пакета сам, поэтому join всегда успешен.
    fn join_thread(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl<T, R, E> Future for BatchHandle<T, R, E> {
    type Output = Result<BatchReport<T, R, E>, WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let received = match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(received) => received,
            Poll::Pending => return Poll::Pending,
        };
        // Отчёт уже отправлен, потоку осталось только выйти.
        this.join_thread();
        match received {
            Ok(outcome) => Poll::Ready(into_report(outcome)),
            Err(_) => Poll::Ready(Err(WaitError::Abandoned)),
        }
    }
}

impl<T, R, E> Drop for BatchHandle<T, R, E> {
    fn drop(&mut self) {
        self.join_thread();
    }
}

fn into_report<T, R, E>(outcome: BatchOutcome<T, R, E>) -> Result<BatchReport<T, R, E>, WaitError> {
    outcome.map_err(|payload| WaitError::Panicked(panic_message(&*payload)))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        format!("{:?}", payload)
    }
}


/// Обработчик для [`StreamingPool`](crate::pool::StreamingPool) и поток его результатов.
///
/// Поток завершается, когда дропнут пул, которому отдан обработчик.
pub fn result_stream<R: Send + 'static>() -> (impl Fn(usize, R) + Send + Sync + 'static, ResultStream<R>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |index: usize, result: R| {
        let _ = tx.send((index, result));
    };
    (handler, ResultStream { receiver: rx })
}

pub struct ResultStream<R> {
    receiver: mpsc::UnboundedReceiver<(usize, R)>,
}

impl<R> Stream for ResultStream<R> {
    type Item = (usize, R);

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
