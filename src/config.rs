use std::{env, str::FromStr};


pub const ENV_LIMIT: &str = "PARALLEL_POOL_LIMIT";
pub const ENV_QUEUE_CAPACITY: &str = "PARALLEL_POOL_QUEUE_CAPACITY";
pub const ENV_THREAD_NAME: &str = "PARALLEL_POOL_THREAD_NAME";
pub const ENV_STACK_SIZE: &str = "PARALLEL_POOL_STACK_SIZE";

const DEFAULT_THREAD_NAME: &str = "parallel-pool";

/// Конфигурация пула потоков
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Лимит одновременных вызовов рабочей функции.
    /// `0` означает один поток, отрицательное значение означает число аппаратных потоков.
    pub limit: isize,
    /// Ёмкость очередей задач и результатов потокового пула.
    /// `None` означает ёмкость, равную числу воркеров.
    pub queue_capacity: Option<usize>,
    /// Префикс имён потоков; к нему добавляется роль и номер.
    pub thread_name: String,
    pub stack_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limit: -1,
            queue_capacity: None,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
            stack_size: None,
        }
    }
}

impl Config {
    pub fn new(limit: isize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn cpu_bound() -> Self {
        Self::new(num_cpus::get() as isize)
    }

    /// Вдвое больше потоков, чем ядер: воркеры большую часть времени ждут.
    pub fn io_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            limit: (num_cpus * 2) as isize,
            queue_capacity: Some(num_cpus * 20),
            ..Default::default()
        }
    }

    /// Читает `PARALLEL_POOL_*` поверх значений по умолчанию.
    /// Некорректные значения пишутся в лог и игнорируются.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(limit) = parse_var(ENV_LIMIT) {
            config.limit = limit;
        }
        if let Some(capacity) = parse_var::<usize>(ENV_QUEUE_CAPACITY) {
            config.queue_capacity = Some(capacity.max(1));
        }
        if let Ok(name) = env::var(ENV_THREAD_NAME) {
            if !name.trim().is_empty() {
                config.thread_name = name;
            }
        }
        if let Some(stack_size) = parse_var(ENV_STACK_SIZE) {
            config.stack_size = Some(stack_size);
        }
        config
    }

    pub fn with_limit(mut self, limit: isize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity.max(1));
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    #[inline]
    pub fn workers(&self) -> usize {
        resolve_limit(self.limit)
    }

    #[inline]
    pub fn batch_workers(&self, count: usize) -> usize {
        resolve_batch_limit(self.limit, count)
    }

    pub(crate) fn thread_builder(&self, role: &str, id: usize) -> std::thread::Builder {
        let mut builder = std::thread::Builder::new().name(format!("{}-{role}-{id}", self.thread_name));
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }
        builder
    }
}

/// `0` → 1, `< 0` → число аппаратных потоков, иначе сам лимит.
pub fn resolve_limit(limit: isize) -> usize {
    match limit {
        0 => 1,
        l if l < 0 => num_cpus::get().max(1),
        l => l as usize,
    }
}

/// Как [`resolve_limit`], но не больше числа входов. Для пустого входа 0.
pub fn resolve_batch_limit(limit: isize, count: usize) -> usize {
    resolve_limit(limit).min(count)
}

fn parse_var<V: FromStr>(key: &str) -> Option<V> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring invalid pool configuration value");
            None
        }
    }
}
