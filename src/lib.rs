//! Пул потоков с ограниченной конкурентностью
//!
//! # Features
//! - Пакетный режим: фиксированный список входов, результаты и ошибки двумя коллекциями
//! - Потоковый режим: долгоживущий пул, задачи по одной, результаты в обработчик
//! - Мягкая (`stop`) и жёсткая (`force_stop`) остановка
//! - Ограниченные очереди crossbeam с обратным давлением
//! - Метрики и async-мост поверх tokio

pub mod batch;
pub mod config;
pub mod errors;
pub mod handle;
pub mod model;
pub mod pool;
pub mod queue;
pub mod worker;

pub use batch::{run, BatchReport, BatchRunner};
pub use config::Config;
pub use errors::{PoolError, SubmitError, TaskError, WaitError};
pub use pool::StreamingPool;
