//! Потоковый режим: долгоживущий пул, задачи подаются по одной,
//! результаты приходят в обработчик с порядковым индексом.

use super::{
    config::Config,
    errors::{PoolError, SubmitError, TaskError},
    model::{PoolMetrics, PoolState, SessionCounters},
    queue::{deliver, OutputQueue, Queue, SessionQueues, TaskQueue},
    worker::{ResultHandler, StreamWorker},
};
use crossbeam::channel::{select, Receiver, Sender};
use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{atomic::Ordering, Arc},
    thread::JoinHandle,
};
use tracing::{debug, error, trace};


type WorkerFn<T, R> = dyn Fn(T) -> R + Send + Sync;
type HandlerFn<R> = dyn Fn(usize, R) + Send + Sync;
type PanicPayload = Box<dyn Any + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    /// Закрыть очередь задач и дождаться, пока воркеры её дочитают.
    Drain,
    /// Закрыть очередь задач и разослать сигналы выхода; очередь бросается.
    Abort,
}


/// Пул с жизненным циклом `Idle → Running → Idle`.
///
/// `start`, `stop` и `force_stop` требуют `&mut self`, поэтому параллельные
/// вызовы жизненного цикла невозможны. `submit` берёт `&self`: запущенный пул
/// можно раздать по ссылке нескольким поставщикам задач.
///
/// Ошибки рабочей функции пул не передаёт. Если они нужны, их надо сложить в
/// тип результата, см. [`StreamingPool::fallible`].
pub struct StreamingPool<T, R> {
    config: Config,
    workers: usize,
    worker: Arc<WorkerFn<T, R>>,
    handler: Arc<HandlerFn<R>>,
    session: Option<Session<T, R>>,
    last_session: Option<PoolMetrics>,
}

impl<T, R> StreamingPool<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// `count`: `0` → 1 воркер, `< 0` → по числу аппаратных потоков.
    pub fn new<W, H>(count: isize, worker: W, handler: H) -> Self
    where
        W: StreamWorker<T, R>,
        H: ResultHandler<R>,
    {
        Self::with_config(Config::new(count), worker, handler)
    }

    pub fn with_config<W, H>(config: Config, worker: W, handler: H) -> Self
    where
        W: StreamWorker<T, R>,
        H: ResultHandler<R>,
    {
        Self {
            workers: config.workers(),
            config,
            worker: Arc::new(worker),
            handler: Arc::new(handler),
            session: None,
            last_session: None,
        }
    }

    /// Повторный вызов на запущенном пуле ничего не делает.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.session.is_some() {
            trace!("pool is already running");
            return Ok(());
        }

        let capacity = self.config.queue_capacity.unwrap_or(self.workers).max(1);
        let SessionQueues { tasks, output, quit } = SessionQueues::<T, R>::new(capacity, self.workers);
        let counters = Arc::new(SessionCounters::default());

        let collector = {
            let output = output.rx.clone();
            let handler = Arc::clone(&self.handler);
            let counters = Arc::clone(&counters);
            self.config
                .thread_builder("collector", 0)
                .spawn(move || collect(output, handler, counters))?
        };

        let Queue { tx: task_tx, rx: task_rx } = tasks;
        let Queue { tx: output_tx, rx: output_rx } = output;
        let Queue { tx: quit_tx, rx: quit_rx } = quit;
        let (workers, spawn_error) = self.spawn_workers(task_rx, output_tx, quit_rx, &counters);

        let session = Session {
            tasks: task_tx,
            output: output_rx,
            quit: quit_tx,
            workers,
            collector,
            counters,
        };

        if let Some(err) = spawn_error {
            error!(error = %err, "failed to spawn pool worker, tearing down session");
            if let Some(payload) = session.shutdown(Shutdown::Abort, self.workers).1 {
                panic::resume_unwind(payload);
            }
            return Err(err.into());
        }

        debug!(workers = self.workers, capacity, "pool started");
        self.session = Some(session);
        Ok(())
    }

    // Свои концы очередей воркеры получают по значению: когда функция
    // вернётся, живые копии останутся только у запущенных потоков.
    fn spawn_workers(
        &self,
        tasks: Receiver<T>,
        output: Sender<R>,
        quit: Receiver<()>,
        counters: &Arc<SessionCounters>,
    ) -> (Vec<JoinHandle<()>>, Option<io::Error>) {
        let mut handles = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let tasks = tasks.clone();
            let output = output.clone();
            let quit = quit.clone();
            let worker = Arc::clone(&self.worker);
            let counters = Arc::clone(counters);
            let spawned = self
                .config
                .thread_builder("worker", id)
                .spawn(move || work(id, tasks, output, quit, worker, counters));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => return (handles, Some(err)),
            }
        }
        (handles, None)
    }

    /// Блокируется, пока в очереди нет места.
    pub fn submit(&self, task: T) -> Result<(), SubmitError<T>> {
        match self.task_queue() {
            Some(queue) => queue.push(task),
            None => Err(SubmitError::NotRunning(task)),
        }
    }

    pub fn try_submit(&self, task: T) -> Result<(), SubmitError<T>> {
        match self.task_queue() {
            Some(queue) => queue.try_push(task),
            None => Err(SubmitError::NotRunning(task)),
        }
    }
}

impl<T, R, E> StreamingPool<T, Result<R, TaskError<T, E>>>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// Пул, в котором неудачная задача приходит в обработчик как `Err(TaskError)`.
    pub fn fallible<W, H>(count: isize, worker: W, handler: H) -> Self
    where
        W: Fn(&T) -> Result<R, E> + Send + Sync + 'static,
        H: ResultHandler<Result<R, TaskError<T, E>>>,
    {
        Self::fallible_with_config(Config::new(count), worker, handler)
    }

    pub fn fallible_with_config<W, H>(config: Config, worker: W, handler: H) -> Self
    where
        W: Fn(&T) -> Result<R, E> + Send + Sync + 'static,
        H: ResultHandler<Result<R, TaskError<T, E>>>,
    {
        let worker = move |task: T| {
            let outcome = worker(&task);
            outcome.map_err(|error| TaskError::new(task, error))
        };
        Self::with_config(config, worker, handler)
    }
}

impl<T, R> StreamingPool<T, R> {
    /// Мягкая остановка: всё, что было поставлено в очередь до вызова,
    /// будет выполнено и доставлено в обработчик до возврата.
    pub fn stop(&mut self) {
        if let Some(payload) = self.finish(Shutdown::Drain) {
            panic::resume_unwind(payload);
        }
    }

    /// Жёсткая остановка: задачи, ещё лежащие в очереди, бросаются.
    /// Уже выполняющиеся задачи всё равно доводятся до конца.
    pub fn force_stop(&mut self) {
        if let Some(payload) = self.finish(Shutdown::Abort) {
            panic::resume_unwind(payload);
        }
    }

    fn finish(&mut self, mode: Shutdown) -> Option<PanicPayload> {
        let session = self.session.take()?;
        debug!(?mode, "stopping pool");
        let (metrics, payload) = session.shutdown(mode, self.workers);
        debug!(
            processed = metrics.processed,
            delivered = metrics.delivered,
            abandoned = metrics.abandoned,
            "pool stopped"
        );
        self.last_session = Some(metrics);
        payload
    }

    pub fn task_queue(&self) -> Option<TaskQueue<'_, T>> {
        self.session
            .as_ref()
            .map(|session| TaskQueue::new(&session.tasks, &session.counters))
    }

    pub fn output_queue(&self) -> Option<OutputQueue<'_, R>> {
        self.session.as_ref().map(|session| OutputQueue::new(&session.output))
    }

    pub fn state(&self) -> PoolState {
        if self.session.is_some() {
            PoolState::Running
        } else {
            PoolState::Idle
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Метрики текущей сессии, а на остановленном пуле метрики последней.
    pub fn metrics(&self) -> PoolMetrics {
        match &self.session {
            Some(session) => session
                .counters
                .snapshot(PoolState::Running, self.workers, session.tasks.len()),
            None => self.last_session.clone().unwrap_or(PoolMetrics {
                state: PoolState::Idle,
                workers: self.workers,
                active_tasks: 0,
                peak_active: 0,
                queued_tasks: 0,
                submitted: 0,
                processed: 0,
                delivered: 0,
                abandoned: 0,
            }),
        }
    }
}

impl<T, R> Drop for StreamingPool<T, R> {
    fn drop(&mut self) {
        if self.finish(Shutdown::Drain).is_some() {
            error!("pool thread panicked during shutdown on drop");
        }
    }
}


struct Session<T, R> {
    tasks: Sender<T>,
    /// Копия для [`OutputQueue`]; закрытию очереди не мешает.
    output: Receiver<R>,
    quit: Sender<()>,
    workers: Vec<JoinHandle<()>>,
    collector: JoinHandle<Option<PanicPayload>>,
    counters: Arc<SessionCounters>,
}

impl<T, R> Session<T, R> {
    fn shutdown(self, mode: Shutdown, workers: usize) -> (PoolMetrics, Option<PanicPayload>) {
        let Session { tasks, output, quit, workers: handles, collector, counters } = self;

        drop(tasks);
        // При мягкой остановке сигнал выхода держим открытым до join, иначе
        // `select!` в воркерах сразу увидит закрытую очередь сигналов.
        let quit = match mode {
            Shutdown::Drain => Some(quit),
            Shutdown::Abort => {
                for _ in 0..handles.len() {
                    if quit.try_send(()).is_err() {
                        break;
                    }
                }
                drop(quit);
                None
            }
        };

        let mut payload = None;
        for handle in handles {
            if let Err(p) = handle.join() {
                payload.get_or_insert(p);
            }
        }
        drop(quit);

        // Воркеров больше нет, значит очередь результатов закрыта и сборщик
        // завершится, как только дочитает её.
        drop(output);
        match collector.join() {
            Ok(Some(p)) | Err(p) => {
                payload.get_or_insert(p);
            }
            Ok(None) => {}
        }

        let submitted = counters.submitted.load(Ordering::Relaxed);
        let processed = counters.processed.load(Ordering::Relaxed);
        counters
            .abandoned
            .store(submitted.saturating_sub(processed), Ordering::Relaxed);

        (counters.snapshot(PoolState::Idle, workers, 0), payload)
    }
}


fn work<T, R>(
    id: usize,
    tasks: Receiver<T>,
    output: Sender<R>,
    quit: Receiver<()>,
    worker: Arc<WorkerFn<T, R>>,
    counters: Arc<SessionCounters>,
) {
    let mut handled = 0usize;
    loop {
        // Сигнал выхода важнее задач: `select!` выбирает среди готовых случайно.
        if quit.try_recv().is_ok() {
            break;
        }
        let next = select! {
            recv(quit) -> _ => None,
            recv(tasks) -> task => task.ok(),
        };
        let Some(task) = next else {
            break;
        };

        let result = {
            let _active = counters.activity.enter();
            worker(task)
        };
        counters.processed.fetch_add(1, Ordering::Relaxed);
        deliver(&output, result, "output");
        handled += 1;
    }
    trace!(worker = id, handled, "pool worker exited");
}

fn collect<R>(output: Receiver<R>, handler: Arc<HandlerFn<R>>, counters: Arc<SessionCounters>) -> Option<PanicPayload> {
    let mut failure = None;
    for (index, result) in output.iter().enumerate() {
        // После паники обработчика дочитываем очередь вхолостую, чтобы воркеры не встали.
        if failure.is_some() {
            continue;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| handler(index, result))) {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                error!(index, "result handler panicked, dropping remaining results");
                failure = Some(payload);
            }
        }
    }
    failure
}
