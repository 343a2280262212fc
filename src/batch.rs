//! Пакетный режим: фиксированный список входов, блокирующий вызов,
//! результаты и ошибки двумя коллекциями.

use super::{
    config::Config,
    errors::TaskError,
    model::ActivityGauge,
    queue::{deliver, BatchQueues, Queue},
    worker::BatchWorker,
};
use crossbeam::channel::{Receiver, Sender};
use std::{
    panic,
    thread::{self, Scope, ScopedJoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, trace};


/// Обрабатывает `inputs` не более чем `limit` потоками одновременно.
///
/// Лимит: `0` → 1, `< 0` → число аппаратных потоков, больше числа входов →
/// число входов. Порядок результатов и ошибок не гарантируется.
pub fn run<T, R, E, W>(limit: isize, inputs: Vec<T>, worker: W) -> (Vec<R>, Vec<TaskError<T, E>>)
where
    T: Send,
    R: Send,
    E: Send,
    W: BatchWorker<T, R, E>,
{
    BatchRunner::new(limit).execute(inputs, worker).into_parts()
}


/// Итог одного пакетного вызова
#[derive(Debug)]
pub struct BatchReport<T, R, E> {
    pub results: Vec<R>,
    pub errors: Vec<TaskError<T, E>>,
    /// Сколько воркеров было запущено на самом деле.
    pub workers: usize,
    pub peak_active: usize,
    pub elapsed: Duration,
}

impl<T, R, E> BatchReport<T, R, E> {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            errors: Vec::new(),
            workers: 0,
            peak_active: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len() + self.errors.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 1.0;
        }
        self.results.len() as f64 / total as f64
    }

    pub fn into_parts(self) -> (Vec<R>, Vec<TaskError<T, E>>) {
        (self.results, self.errors)
    }
}


#[derive(Debug, Clone, Default)]
pub struct BatchRunner {
    config: Config,
}

impl BatchRunner {
    pub fn new(limit: isize) -> Self {
        Self::with_config(Config::new(limit))
    }

    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn execute<T, R, E, W>(&self, inputs: Vec<T>, worker: W) -> BatchReport<T, R, E>
    where
        T: Send,
        R: Send,
        E: Send,
        W: BatchWorker<T, R, E>,
    {
        let count = inputs.len();
        if count == 0 {
            return BatchReport::empty();
        }

        let workers = self.config.batch_workers(count);
        let gauge = ActivityGauge::new();
        let started = Instant::now();
        debug!(count, workers, "batch started");

        let BatchQueues { tasks, results, errors } = BatchQueues::<T, R, E>::with_capacity(count);
        let Queue { tx: task_tx, rx: task_rx } = tasks;
        let Queue { tx: result_tx, rx: result_rx } = results;
        let Queue { tx: error_tx, rx: error_rx } = errors;

        let (results, errors) = thread::scope(|s| {
            self.spawn(s, "feeder", 0, move || {
                for input in inputs {
                    // Все воркеры упали: дальше кормить некого, паника всплывёт при join.
                    if task_tx.send(input).is_err() {
                        break;
                    }
                }
            });

            let result_collector = self.spawn(s, "results", 0, move || result_rx.iter().collect::<Vec<R>>());
            let error_collector = self.spawn(s, "errors", 0, move || error_rx.iter().collect::<Vec<_>>());

            let handles: Vec<_> = (0..workers)
                .map(|id| {
                    let tasks = task_rx.clone();
                    let results = result_tx.clone();
                    let errors = error_tx.clone();
                    let worker = &worker;
                    let gauge = &gauge;
                    self.spawn(s, "worker", id, move || drain(id, tasks, results, errors, worker, gauge))
                })
                .collect();

            // Отпускаем свои концы: теперь очереди результатов и ошибок закроются
            // ровно тогда, когда завершится последний воркер.
            drop(task_rx);
            drop(result_tx);
            drop(error_tx);

            let mut worker_panic = None;
            for handle in handles {
                if let Err(payload) = handle.join() {
                    worker_panic.get_or_insert(payload);
                }
            }

            let results = result_collector.join().unwrap_or_else(|payload| panic::resume_unwind(payload));
            let errors = error_collector.join().unwrap_or_else(|payload| panic::resume_unwind(payload));

            if let Some(payload) = worker_panic {
                panic::resume_unwind(payload);
            }
            (results, errors)
        });

        let report = BatchReport {
            results,
            errors,
            workers,
            peak_active: gauge.peak(),
            elapsed: started.elapsed(),
        };
        debug!(
            results = report.results.len(),
            errors = report.errors.len(),
            elapsed = ?report.elapsed,
            "batch finished"
        );
        report
    }

    fn spawn<'scope, 'env, F, O>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        role: &str,
        id: usize,
        f: F,
    ) -> ScopedJoinHandle<'scope, O>
    where
        F: FnOnce() -> O + Send + 'scope,
        O: Send + 'scope,
    {
        self.config
            .thread_builder(role, id)
            .spawn_scoped(scope, f)
            .unwrap_or_else(|err| panic!("failed to spawn batch {role} thread: {err}"))
    }
}

fn drain<T, R, E, W>(
    id: usize,
    tasks: Receiver<T>,
    results: Sender<R>,
    errors: Sender<TaskError<T, E>>,
    worker: &W,
    gauge: &ActivityGauge,
) where
    W: BatchWorker<T, R, E>,
{
    let mut handled = 0usize;
    for task in tasks.iter() {
        let outcome = {
            let _active = gauge.enter();
            worker(&task)
        };
        match outcome {
            Ok(result) => deliver(&results, result, "result"),
            Err(error) => deliver(&errors, TaskError::new(task, error), "error"),
        }
        handled += 1;
    }
    trace!(worker = id, handled, "batch worker finished");
}
