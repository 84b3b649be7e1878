use crate::{
    alloc::CarryAllocator,
    config::GridConfig,
    error::ScanError,
    executor::{Event, Executor},
};
use kernel_tools::{BlockShape, CarryApplyKernel, GlobalMem, LocalReduceKernel, ScanMode};
use tracing::debug;

/// Progress of a chained scan through its blocks.
///
/// Blocks run strictly one after another: block `b + 1` cannot be dispatched
/// until both passes of block `b` have completed, because its carry-in is read
/// from block `b`'s final values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Pending,
    Dispatched(usize),
    Completed(usize),
    Done,
}

/// Splits a sequence into blocks and tracks which block is in flight.
#[derive(Debug)]
pub struct BlockDispatcher {
    grid: GridConfig,
    len: usize,
    next_start: usize,
    state: DispatchState,
}

impl BlockDispatcher {
    pub fn new(grid: GridConfig, len: usize) -> Self {
        Self {
            grid,
            len,
            next_start: 0,
            state: DispatchState::Pending,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// The most groups any block of the sequence uses. The first block is
    /// always the largest.
    pub fn max_groups(&self) -> usize {
        self.grid.block_shape(0, 0, self.len).groups
    }

    /// Dispatches the next block, or moves to `Done` when none remain.
    ///
    /// Panics if the previous block has not been marked complete.
    pub fn dispatch_next(&mut self) -> Option<BlockShape> {
        let index = match self.state {
            DispatchState::Pending => 0,
            DispatchState::Completed(b) => b + 1,
            DispatchState::Done => return None,
            DispatchState::Dispatched(b) => panic!("block {b} dispatched before completing"),
        };

        if self.next_start >= self.len {
            self.state = DispatchState::Done;
            return None;
        }

        let shape = self
            .grid
            .block_shape(index, self.next_start, self.len - self.next_start);
        self.next_start = shape.end();
        self.state = DispatchState::Dispatched(index);
        Some(shape)
    }

    /// Marks the in-flight block as completed.
    ///
    /// Panics if `shape` is not the block in flight.
    pub fn complete(&mut self, shape: &BlockShape) {
        assert_eq!(
            self.state,
            DispatchState::Dispatched(shape.index),
            "completing a block that is not in flight"
        );
        self.state = DispatchState::Completed(shape.index);
    }

    /// Whether another block follows the last dispatched one.
    pub fn has_more(&self) -> bool {
        self.next_start < self.len
    }
}

/// Everything the kernels of one scan call share.
pub(crate) struct ScanPlan<'a, I, T, C, U> {
    pub input: GlobalMem<'a, I>,
    pub output: GlobalMem<'a, T>,
    pub len: usize,
    pub mode: ScanMode,
    pub seed: Option<T>,
    pub combine: &'a C,
    pub transform: &'a U,
}

/// Runs the two passes of every block of `plan`, chaining carries from block
/// to block, and returns once the last block has completed.
pub(crate) fn drive<E, A, I, T, C, U>(
    executor: &E,
    allocator: &A,
    grid: GridConfig,
    plan: ScanPlan<'_, I, T, C, U>,
) -> Result<(), ScanError>
where
    E: Executor,
    A: CarryAllocator,
    I: Copy + Send + Sync,
    T: Copy + Send + Sync,
    C: Fn(T, T) -> T + Sync,
    U: Fn(I) -> T + Sync,
{
    if plan.len == 0 {
        return Ok(());
    }

    let mut dispatcher = BlockDispatcher::new(grid, plan.len);
    let mut storage = allocator.allocate::<T>(dispatcher.max_groups())?;
    let mut carry = plan.seed;
    let mut prior: Option<Event> = None;

    while let Some(shape) = dispatcher.dispatch_next() {
        debug!(
            block = shape.index,
            start = shape.start,
            len = shape.len,
            groups = shape.groups,
            elements_per_lane = shape.elements_per_lane,
            "dispatch block"
        );

        storage.reset();
        let applied = {
            let (carries, resolved) = storage.views(shape.groups);

            let reduce = LocalReduceKernel::new(
                plan.input,
                carries,
                shape,
                plan.mode == ScanMode::Exclusive,
                plan.combine,
                plan.transform,
            );
            let apply = CarryApplyKernel::new(
                plan.input,
                plan.output,
                carries.as_read_only(),
                resolved,
                shape,
                plan.mode,
                carry,
                plan.combine,
                plan.transform,
            );

            let deps: Vec<&Event> = prior.iter().collect();
            // Groups of one dispatch touch disjoint slots and output ranges,
            // and the caller's buffers are borrowed for the whole call.
            unsafe {
                let reduced = executor.submit(&reduce, shape.grid(), &deps)?;
                executor.submit(&apply, shape.grid(), &[&reduced])?
            }
        };

        executor.wait(applied.clone())?;
        storage.settle(shape.groups);
        debug_assert!(
            storage.resolved()[..shape.groups]
                .iter()
                .enumerate()
                .all(|(g, slot)| slot.is_some() == (g > 0 || carry.is_some())),
            "block {} left a group without its carry-in",
            shape.index
        );
        dispatcher.complete(&shape);
        debug!(block = shape.index, "block complete");

        if dispatcher.has_more() {
            carry = chained_carry(&plan, &shape, storage.tail());
        }
        prior = Some(applied);
    }

    Ok(())
}

/// The carry-in for the block after `shape`: the combined value of every
/// element up to and including the block's last one.
///
/// An inclusive scan has already written exactly that to the block's last
/// output. An exclusive scan wrote the prefix *before* the last element, so the
/// last element itself, cached by the local reduce pass before it could be
/// overwritten in place, is combined on.
fn chained_carry<I, T, C, U>(
    plan: &ScanPlan<'_, I, T, C, U>,
    shape: &BlockShape,
    tail: Option<T>,
) -> Option<T>
where
    T: Copy,
    C: Fn(T, T) -> T,
{
    let last = shape.end() - 1;
    match plan.mode {
        ScanMode::Inclusive => Some(unsafe { plan.output.read(last) }),
        ScanMode::Exclusive => {
            // Position 0 of an unseeded exclusive scan is never written.
            let prefix = if last == 0 && plan.seed.is_none() {
                None
            } else {
                Some(unsafe { plan.output.read(last) })
            };
            match (prefix, tail) {
                (Some(prefix), Some(tail)) => Some((plan.combine)(prefix, tail)),
                (prefix, tail) => prefix.or(tail),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BlockDispatcher, DispatchState};
    use crate::GridConfig;

    #[test]
    fn walks_blocks_in_order() {
        let grid = GridConfig::new(2, 2, 2).unwrap();
        let mut dispatcher = BlockDispatcher::new(grid, 19);
        assert_eq!(dispatcher.state(), DispatchState::Pending);
        assert_eq!(dispatcher.max_groups(), 2);

        let mut starts = Vec::new();
        while let Some(shape) = dispatcher.dispatch_next() {
            assert_eq!(dispatcher.state(), DispatchState::Dispatched(shape.index));
            starts.push((shape.start, shape.len));
            dispatcher.complete(&shape);
            assert_eq!(dispatcher.state(), DispatchState::Completed(shape.index));
        }

        assert_eq!(starts, vec![(0, 8), (8, 8), (16, 3)]);
        assert_eq!(dispatcher.state(), DispatchState::Done);
        assert!(dispatcher.dispatch_next().is_none());
    }

    #[test]
    fn empty_sequence_is_done_immediately() {
        let mut dispatcher = BlockDispatcher::new(GridConfig::default(), 0);
        assert!(dispatcher.dispatch_next().is_none());
        assert_eq!(dispatcher.state(), DispatchState::Done);
    }

    #[test]
    #[should_panic(expected = "dispatched before completing")]
    fn next_block_waits_for_completion() {
        let mut dispatcher = BlockDispatcher::new(GridConfig::new(2, 1, 1).unwrap(), 10);
        dispatcher.dispatch_next();
        dispatcher.dispatch_next();
    }

    #[test]
    #[should_panic(expected = "not in flight")]
    fn completing_a_stale_block_panics() {
        let mut dispatcher = BlockDispatcher::new(GridConfig::new(2, 1, 1).unwrap(), 10);
        let first = dispatcher.dispatch_next().unwrap();
        dispatcher.complete(&first);
        dispatcher.dispatch_next();
        dispatcher.complete(&first);
    }
}
