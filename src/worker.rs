//! Контракт рабочей функции.
//!
//! Пул ничего не знает о задачах и результатах: всё, что ему нужно, это
//! функция, которую можно безопасно вызывать одновременно из нескольких потоков.
//! Трейты ниже реализованы для любых подходящих замыканий, поэтому вызывающему
//! коду не нужно ничего реализовывать вручную.

/// Рабочая функция пакетного режима: `&T -> Result<R, E>`.
///
/// Задача передаётся по ссылке, чтобы при ошибке её можно было вернуть
/// вызывающему внутри [`TaskError`](crate::errors::TaskError).
pub trait BatchWorker<T, R, E>: Fn(&T) -> Result<R, E> + Sync {}

impl<F, T, R, E> BatchWorker<T, R, E> for F where F: Fn(&T) -> Result<R, E> + Sync {}

/// Рабочая функция потокового режима: `T -> R`, без канала ошибок.
pub trait StreamWorker<T, R>: Fn(T) -> R + Send + Sync + 'static {}

impl<F, T, R> StreamWorker<T, R> for F where F: Fn(T) -> R + Send + Sync + 'static {}

/// Обработчик результатов потокового режима: `(index, result)`.
///
/// Вызывается только из потока-сборщика, никогда параллельно сам с собой.
pub trait ResultHandler<R>: Fn(usize, R) + Send + Sync + 'static {}

impl<F, R> ResultHandler<R> for F where F: Fn(usize, R) + Send + Sync + 'static {}
