use std::sync::atomic::{AtomicUsize, Ordering};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolState {
    #[default]
    Idle,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMetrics {
    pub state: PoolState,
    pub workers: usize,
    pub active_tasks: usize,
    pub peak_active: usize,
    pub queued_tasks: usize,
    pub submitted: usize,
    pub processed: usize,
    pub delivered: usize,
    pub abandoned: usize,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.workers == 0 {
            return 0.0;
        }
        self.active_tasks as f64 / self.workers as f64
    }

    /// Задачи, принятые пулом, но ещё не выполненные и не брошенные.
    pub fn pending(&self) -> usize {
        self.submitted.saturating_sub(self.processed + self.abandoned)
    }
}


/// Счётчик одновременно выполняющихся вызовов рабочей функции и его пик.
#[derive(Debug, Default)]
pub struct ActivityGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ActivityGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Отмечает начало вызова; конец отмечается при дропе guard'а.
    #[inline]
    pub fn enter(&self) -> ActivityGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
        ActivityGuard { gauge: self }
    }

    #[inline]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    #[inline]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

pub struct ActivityGuard<'a> {
    gauge: &'a ActivityGauge,
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        self.gauge.active.fetch_sub(1, Ordering::AcqRel);
    }
}


/// Счётчики одной сессии потокового пула.
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub(crate) activity: ActivityGauge,
    pub(crate) submitted: AtomicUsize,
    pub(crate) processed: AtomicUsize,
    pub(crate) delivered: AtomicUsize,
    pub(crate) abandoned: AtomicUsize,
}

impl SessionCounters {
    pub(crate) fn snapshot(&self, state: PoolState, workers: usize, queued_tasks: usize) -> PoolMetrics {
        PoolMetrics {
            state,
            workers,
            active_tasks: self.activity.active(),
            peak_active: self.activity.peak(),
            queued_tasks,
            submitted: self.submitted.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}
