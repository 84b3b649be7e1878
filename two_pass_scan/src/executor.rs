use crate::error::ScanError;
use kernel_tools::{GridShape, GroupId, Kernel};
use rand::{seq::SliceRandom, SeedableRng};
use rand_hc::Hc128Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tracing::trace;

/// Completion handle of one kernel dispatch.
#[derive(Debug, Clone)]
pub struct Event {
    id: u64,
    kernel: &'static str,
    groups: usize,
    done: Arc<AtomicBool>,
}

impl Event {
    fn new(id: u64, kernel: &'static str, groups: usize) -> Self {
        Self {
            id,
            kernel,
            groups,
            done: Arc::new(AtomicBool::new(false)),
        }
    }

    fn complete(&self) {
        self.done.store(true, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kernel(&self) -> &'static str {
        self.kernel
    }

    pub fn groups(&self) -> usize {
        self.groups
    }

    fn ensure_complete(&self) -> Result<(), ScanError> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(ScanError::UnmetDependency {
                event: self.id,
                kernel: self.kernel,
            })
        }
    }
}

/// Runs kernels over a grid of groups.
///
/// A kernel submitted with dependencies may only start once every dependency
/// has completed. Groups within one dispatch have no ordering guarantee.
pub trait Executor {
    /// Runs `kernel` over every group of `grid` once `deps` have completed.
    ///
    /// # Safety
    ///
    /// The conditions of [`Kernel::run_group`] must hold for every group of
    /// `grid`.
    unsafe fn submit<K: Kernel>(
        &self,
        kernel: &K,
        grid: GridShape,
        deps: &[&Event],
    ) -> Result<Event, ScanError>;

    /// Blocks until `event` has completed.
    fn wait(&self, event: Event) -> Result<(), ScanError>;
}

/// Hands out increasing event ids.
#[derive(Debug, Default)]
struct EventCounter(AtomicU64);

impl EventCounter {
    fn next(&self, kernel: &'static str, groups: usize) -> Event {
        Event::new(self.0.fetch_add(1, Ordering::Relaxed), kernel, groups)
    }
}

/// Runs every group of a dispatch concurrently on a rayon thread pool.
///
/// Dispatches run to completion inside `submit`, so the returned event is
/// already complete and dependencies submitted in program order are always
/// satisfied.
#[derive(Debug, Default)]
pub struct RayonExecutor {
    pool: Option<Arc<ThreadPool>>,
    events: EventCounter,
}

impl RayonExecutor {
    /// Uses rayon's global thread pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a dedicated pool with `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self, ScanError> {
        let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
        Ok(Self::with_pool(Arc::new(pool)))
    }

    pub fn with_pool(pool: Arc<ThreadPool>) -> Self {
        Self {
            pool: Some(pool),
            events: EventCounter::default(),
        }
    }
}

impl Executor for RayonExecutor {
    unsafe fn submit<K: Kernel>(
        &self,
        kernel: &K,
        grid: GridShape,
        deps: &[&Event],
    ) -> Result<Event, ScanError> {
        for dep in deps {
            dep.ensure_complete()?;
        }

        let event = self.events.next(K::NAME, grid.groups);
        trace!(event = event.id, kernel = K::NAME, groups = grid.groups, "submit");

        let run = || {
            (0..grid.groups)
                .into_par_iter()
                .for_each(|g| unsafe { kernel.run_group(GroupId(g)) })
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }

        event.complete();
        Ok(event)
    }

    fn wait(&self, event: Event) -> Result<(), ScanError> {
        event.ensure_complete()
    }
}

/// The order in which [`SerialExecutor`] runs the groups of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOrder {
    Forward,
    Reverse,
    /// A permutation drawn from a generator seeded with the given value,
    /// redrawn for every dispatch.
    Shuffled(u64),
}

/// Runs the groups of a dispatch one after another on the calling thread.
///
/// Useful for checking that results do not depend on the order in which
/// groups happen to be scheduled.
#[derive(Debug)]
pub struct SerialExecutor {
    order: GroupOrder,
    events: EventCounter,
}

impl Default for SerialExecutor {
    fn default() -> Self {
        Self::new(GroupOrder::Forward)
    }
}

impl SerialExecutor {
    pub fn new(order: GroupOrder) -> Self {
        Self {
            order,
            events: EventCounter::default(),
        }
    }

    /// The order groups run in for the dispatch with the given event id.
    fn schedule(&self, groups: usize, event: u64) -> Vec<usize> {
        let mut order: Vec<usize> = (0..groups).collect();
        match self.order {
            GroupOrder::Forward => {}
            GroupOrder::Reverse => order.reverse(),
            GroupOrder::Shuffled(seed) => {
                let mut rng = Hc128Rng::seed_from_u64(seed ^ event);
                order.shuffle(&mut rng);
            }
        }
        order
    }
}

impl Executor for SerialExecutor {
    unsafe fn submit<K: Kernel>(
        &self,
        kernel: &K,
        grid: GridShape,
        deps: &[&Event],
    ) -> Result<Event, ScanError> {
        for dep in deps {
            dep.ensure_complete()?;
        }

        let event = self.events.next(K::NAME, grid.groups);
        trace!(event = event.id, kernel = K::NAME, groups = grid.groups, order = ?self.order, "submit");

        for g in self.schedule(grid.groups, event.id) {
            unsafe { kernel.run_group(GroupId(g)) };
        }

        event.complete();
        Ok(event)
    }

    fn wait(&self, event: Event) -> Result<(), ScanError> {
        event.ensure_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<usize>>,
    }

    impl Kernel for Recorder {
        const NAME: &'static str = "recorder";

        unsafe fn run_group(&self, group: GroupId) {
            self.seen.lock().unwrap().push(group.0);
        }
    }

    fn grid(groups: usize) -> GridShape {
        GridShape {
            groups,
            lane_width: 4,
        }
    }

    fn recorder() -> Recorder {
        Recorder {
            seen: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn rayon_runs_every_group_once() {
        let executor = RayonExecutor::with_threads(3).unwrap();
        let kernel = recorder();
        let event = unsafe { executor.submit(&kernel, grid(100), &[]) }.unwrap();
        assert!(event.is_complete());
        assert_eq!(event.kernel(), "recorder");
        assert_eq!(event.groups(), 100);
        executor.wait(event).unwrap();

        let mut seen = kernel.seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn serial_orders() {
        let reverse = SerialExecutor::new(GroupOrder::Reverse);
        let kernel = recorder();
        unsafe { reverse.submit(&kernel, grid(4), &[]) }.unwrap();
        assert_eq!(*kernel.seen.lock().unwrap(), vec![3, 2, 1, 0]);

        let shuffled = SerialExecutor::new(GroupOrder::Shuffled(7));
        let kernel = recorder();
        unsafe { shuffled.submit(&kernel, grid(50), &[]) }.unwrap();
        let mut seen = kernel.seen.into_inner().unwrap();
        assert_ne!(seen, (0..50).collect::<Vec<_>>());
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn event_ids_increase() {
        let executor = SerialExecutor::default();
        let kernel = recorder();
        let first = unsafe { executor.submit(&kernel, grid(1), &[]) }.unwrap();
        let second = unsafe { executor.submit(&kernel, grid(1), &[&first]) }.unwrap();
        assert!(second.id() > first.id());
    }

    #[test]
    fn incomplete_dependency_is_rejected() {
        let executor = SerialExecutor::default();
        let pending = Event::new(99, "pending", 1);
        let kernel = recorder();
        let err = unsafe { executor.submit(&kernel, grid(1), &[&pending]) }.unwrap_err();
        assert!(matches!(err, ScanError::UnmetDependency { event: 99, .. }));
        assert!(kernel.seen.lock().unwrap().is_empty());
        assert!(executor.wait(pending).is_err());
    }
}
