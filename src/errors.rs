use std::{
    error::Error as StdError,
    fmt::{self, Debug, Display},
    io,
};
use thiserror::Error;


/// Задача, завершившаяся ошибкой, вместе с самой ошибкой.
///
/// Создаётся ровно один раз на каждую упавшую задачу и никогда не
/// перезапускается. `Display` выводит `"<task> <error>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError<T, E> {
    task: T,
    error: E,
}

impl<T, E> TaskError<T, E> {
    pub fn new(task: T, error: E) -> Self {
        Self { task, error }
    }

    #[inline]
    pub fn task(&self) -> &T {
        &self.task
    }

    #[inline]
    pub fn error(&self) -> &E {
        &self.error
    }

    pub fn into_parts(self) -> (T, E) {
        (self.task, self.error)
    }
}

impl<T: Display, E: Display> Display for TaskError<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.task, self.error)
    }
}

impl<T, E> StdError for TaskError<T, E>
where
    T: Debug + Display,
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.error)
    }
}

/// Одна строка `"<task> <error>"` на каждую ошибку, в исходном порядке.
pub fn format_task_errors<T: Display, E: Display>(errors: &[TaskError<T, E>]) -> Vec<String> {
    errors.iter().map(ToString::to_string).collect()
}

pub fn print_task_errors<T: Display, E: Display>(errors: &[TaskError<T, E>]) {
    for line in format_task_errors(errors) {
        println!("{line}");
    }
}

/// То же, что [`print_task_errors`], но через `tracing` на уровне WARN.
pub fn log_task_errors<T: Display, E: Display>(errors: &[TaskError<T, E>]) {
    for err in errors {
        tracing::warn!(task = %err.task, error = %err.error, "task failed");
    }
}


/// Ошибки жизненного цикла пула.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to spawn pool thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Задачу не удалось поставить в очередь. Задача всегда возвращается вызывающему.
#[derive(Error, PartialEq, Eq)]
pub enum SubmitError<T> {
    #[error("pool is not running")]
    NotRunning(T),
    #[error("task queue is full")]
    Full(T),
    #[error("no worker is left to take the task")]
    Disconnected(T),
}

impl<T> SubmitError<T> {
    pub fn into_task(self) -> T {
        match self {
            SubmitError::NotRunning(task)
            | SubmitError::Full(task)
            | SubmitError::Disconnected(task) => task,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, SubmitError::Full(_))
    }
}

// Задача может не реализовывать Debug, поэтому её содержимое не печатаем.
impl<T> Debug for SubmitError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::NotRunning(_) => f.pad("NotRunning(..)"),
            SubmitError::Full(_) => f.pad("Full(..)"),
            SubmitError::Disconnected(_) => f.pad("Disconnected(..)"),
        }
    }
}

/// Ошибки ожидания пакета, запущенного в фоне через [`spawn_batch`](crate::handle::spawn_batch).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum WaitError {
    #[error("batch panicked: {0}")]
    Panicked(String),
    #[error("batch thread exited without a report")]
    Abandoned,
    #[error("timed out waiting for batch")]
    Timeout,
}
