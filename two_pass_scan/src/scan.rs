use crate::{
    alloc::{CarryAllocator, HostAllocator},
    config::GridConfig,
    dispatch::{drive, ScanPlan},
    error::ScanError,
    executor::{Executor, RayonExecutor},
};
use kernel_tools::{GlobalMem, ScanMode};
use tracing::instrument;

fn identity<T>(x: T) -> T {
    x
}

/// What to compute: the combine operator, the transform applied to each input
/// element before it is combined, inclusive or exclusive, and an optional
/// seed.
///
/// `combine` must be associative. It need not be commutative: values are
/// always combined as `combine(earlier, later)`. Nothing checks associativity;
/// an operator that is not gives wrong results, not an error.
///
/// The seed is folded in on the left of everything. An exclusive scan without
/// a seed has nothing to write at position 0 and leaves that output slot as it
/// was.
#[derive(Debug, Clone, Copy)]
pub struct ScanOp<T, C, U> {
    combine: C,
    transform: U,
    mode: ScanMode,
    seed: Option<T>,
}

impl<T, C> ScanOp<T, C, fn(T) -> T>
where
    C: Fn(T, T) -> T,
{
    pub fn inclusive(combine: C) -> Self {
        Self {
            combine,
            transform: identity::<T>,
            mode: ScanMode::Inclusive,
            seed: None,
        }
    }

    pub fn exclusive(combine: C, seed: T) -> Self {
        Self {
            combine,
            transform: identity::<T>,
            mode: ScanMode::Exclusive,
            seed: Some(seed),
        }
    }
}

impl<T, C, U> ScanOp<T, C, U> {
    /// Replaces the transform. The input element type becomes the argument
    /// type of `transform`.
    pub fn with_transform<V>(self, transform: V) -> ScanOp<T, C, V> {
        ScanOp {
            combine: self.combine,
            transform,
            mode: self.mode,
            seed: self.seed,
        }
    }

    pub fn with_seed(self, seed: T) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    pub fn without_seed(self) -> Self {
        Self { seed: None, ..self }
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }
}

impl<T: Copy, C, U> ScanOp<T, C, U> {
    pub fn seed(&self) -> Option<T> {
        self.seed
    }
}

/// The scan engine: an executor to run kernels on, an allocator for carry
/// storage, and the launch geometry.
#[derive(Debug, Default)]
pub struct Scanner<E = RayonExecutor, A = HostAllocator> {
    executor: E,
    allocator: A,
    grid: GridConfig,
}

impl Scanner<RayonExecutor, HostAllocator> {
    /// Runs on rayon's global pool with heap-allocated carry storage.
    pub fn rayon(grid: GridConfig) -> Self {
        Self::new(RayonExecutor::new(), HostAllocator, grid)
    }
}

impl<E, A> Scanner<E, A>
where
    E: Executor,
    A: CarryAllocator,
{
    pub fn new(executor: E, allocator: A, grid: GridConfig) -> Self {
        Self {
            executor,
            allocator,
            grid,
        }
    }

    pub fn with_grid(self, grid: GridConfig) -> Self {
        Self { grid, ..self }
    }

    pub fn grid(&self) -> GridConfig {
        self.grid
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Scans `input` into the first `input.len()` elements of `output`.
    #[instrument(skip_all, fields(len = input.len(), mode = ?op.mode))]
    pub fn scan<I, T, C, U>(
        &self,
        input: &[I],
        output: &mut [T],
        op: &ScanOp<T, C, U>,
    ) -> Result<(), ScanError>
    where
        I: Copy + Send + Sync,
        T: Copy + Send + Sync,
        C: Fn(T, T) -> T + Sync,
        U: Fn(I) -> T + Sync,
    {
        if output.len() < input.len() {
            return Err(ScanError::LengthMismatch {
                input: input.len(),
                output: output.len(),
            });
        }

        let len = input.len();
        let plan = ScanPlan {
            input: GlobalMem::read_only(input),
            output: GlobalMem::new(&mut output[..len]),
            len,
            mode: op.mode,
            seed: op.seed,
            combine: &op.combine,
            transform: &op.transform,
        };
        drive(&self.executor, &self.allocator, self.grid, plan)
    }

    /// Scans `data` in place.
    #[instrument(skip_all, fields(len = data.len(), mode = ?op.mode))]
    pub fn scan_in_place<T, C, U>(&self, data: &mut [T], op: &ScanOp<T, C, U>) -> Result<(), ScanError>
    where
        T: Copy + Send + Sync,
        C: Fn(T, T) -> T + Sync,
        U: Fn(T) -> T + Sync,
    {
        let len = data.len();
        let output = GlobalMem::new(data);
        let plan = ScanPlan {
            input: output.as_read_only(),
            output,
            len,
            mode: op.mode,
            seed: op.seed,
            combine: &op.combine,
            transform: &op.transform,
        };
        drive(&self.executor, &self.allocator, self.grid, plan)
    }
}

/// `output[i] = input[0] ⊕ ... ⊕ input[i]` on the default scanner.
pub fn inclusive_scan<T, C>(input: &[T], output: &mut [T], combine: C) -> Result<(), ScanError>
where
    T: Copy + Send + Sync,
    C: Fn(T, T) -> T + Sync,
{
    Scanner::rayon(GridConfig::default()).scan(input, output, &ScanOp::inclusive(combine))
}

/// `output[0] = seed` and `output[i] = output[i - 1] ⊕ input[i - 1]` on the
/// default scanner.
pub fn exclusive_scan<T, C>(
    input: &[T],
    output: &mut [T],
    seed: T,
    combine: C,
) -> Result<(), ScanError>
where
    T: Copy + Send + Sync,
    C: Fn(T, T) -> T + Sync,
{
    Scanner::rayon(GridConfig::default()).scan(input, output, &ScanOp::exclusive(combine, seed))
}

/// Inclusive scan of `transform(input[i])`, optionally seeded.
pub fn transform_inclusive_scan<I, T, C, U>(
    input: &[I],
    output: &mut [T],
    combine: C,
    transform: U,
    seed: Option<T>,
) -> Result<(), ScanError>
where
    I: Copy + Send + Sync,
    T: Copy + Send + Sync,
    C: Fn(T, T) -> T + Sync,
    U: Fn(I) -> T + Sync,
{
    let op = ScanOp::inclusive(combine).with_transform(transform);
    let op = match seed {
        Some(seed) => op.with_seed(seed),
        None => op,
    };
    Scanner::rayon(GridConfig::default()).scan(input, output, &op)
}

/// Exclusive scan of `transform(input[i])` starting from `seed`.
pub fn transform_exclusive_scan<I, T, C, U>(
    input: &[I],
    output: &mut [T],
    seed: T,
    combine: C,
    transform: U,
) -> Result<(), ScanError>
where
    I: Copy + Send + Sync,
    T: Copy + Send + Sync,
    C: Fn(T, T) -> T + Sync,
    U: Fn(I) -> T + Sync,
{
    let op = ScanOp::exclusive(combine, seed).with_transform(transform);
    Scanner::rayon(GridConfig::default()).scan(input, output, &op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        executor::{GroupOrder, SerialExecutor},
        BudgetAllocator,
    };

    fn add(a: i64, b: i64) -> i64 {
        a + b
    }

    fn small_grid() -> GridConfig {
        GridConfig::new(4, 2, 3).unwrap()
    }

    #[test]
    fn inclusive_concrete() {
        let input = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut output = [0; 8];
        inclusive_scan(&input, &mut output, add).unwrap();
        assert_eq!(output, [1, 3, 6, 10, 15, 21, 28, 36]);
    }

    #[test]
    fn exclusive_concrete() {
        let input = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut output = [0; 8];
        exclusive_scan(&input, &mut output, 0, add).unwrap();
        assert_eq!(output, [0, 1, 3, 6, 10, 15, 21, 28]);
    }

    #[test]
    fn exclusive_in_place_across_blocks() {
        // Blocks of four elements, so the last element of each block is
        // overwritten before the next block reads its carry.
        let scanner = Scanner::new(
            SerialExecutor::default(),
            HostAllocator,
            GridConfig::new(2, 1, 2).unwrap(),
        );
        let mut data = [1, 2, 3, 4, 5, 6, 7, 8];
        scanner
            .scan_in_place(&mut data, &ScanOp::exclusive(add, 0))
            .unwrap();
        assert_eq!(data, [0, 1, 3, 6, 10, 15, 21, 28]);
    }

    #[test]
    fn inclusive_in_place_across_blocks() {
        let scanner =
            Scanner::rayon(GridConfig::default()).with_grid(GridConfig::new(2, 2, 1).unwrap());
        let mut data: Vec<i64> = (1..=11).collect();
        scanner
            .scan_in_place(&mut data, &ScanOp::inclusive(add))
            .unwrap();
        let input: Vec<i64> = (1..=11).collect();
        assert_eq!(data, crate::reference::inclusive_scan(&input, add, |x| x, None));
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut output = [7i64; 3];
        inclusive_scan(&[], &mut output, add).unwrap();
        exclusive_scan(&[], &mut output, 1, add).unwrap();
        assert_eq!(output, [7, 7, 7]);
    }

    #[test]
    fn single_element() {
        let mut output = [0i64; 1];
        inclusive_scan(&[5], &mut output, add).unwrap();
        assert_eq!(output, [5]);

        transform_inclusive_scan(&[5i64], &mut output, add, |x| x * 2, Some(100)).unwrap();
        assert_eq!(output, [110]);

        exclusive_scan(&[5], &mut output, 42, add).unwrap();
        assert_eq!(output, [42]);
    }

    #[test]
    fn exact_single_group() {
        let grid = GridConfig::new(4, 2, 1).unwrap();
        assert_eq!(grid.block_shape(0, 0, grid.group_span()).groups, 1);
        let input: Vec<i64> = (0..grid.group_span() as i64).collect();
        let mut output = vec![0; input.len()];
        let scanner = Scanner::new(SerialExecutor::default(), HostAllocator, grid);
        scanner
            .scan(&input, &mut output, &ScanOp::inclusive(add))
            .unwrap();
        assert_eq!(output, crate::reference::inclusive_scan(&input, add, |x| x, None));
    }

    #[test]
    fn output_may_be_longer_but_not_shorter() {
        let input = [1i64, 1, 1];
        let mut output = [0i64; 5];
        inclusive_scan(&input, &mut output, add).unwrap();
        assert_eq!(output, [1, 2, 3, 0, 0]);

        let mut short = [0i64; 2];
        let err = inclusive_scan(&input, &mut short, add).unwrap_err();
        assert!(matches!(err, ScanError::LengthMismatch { input: 3, output: 2 }));
    }

    #[test]
    fn transform_changes_the_element_type() {
        let words = ["a", "bb", "", "dddd"];
        let mut lengths = [0usize; 4];
        transform_exclusive_scan(&words, &mut lengths, 0, |a, b| a + b, |w: &str| w.len()).unwrap();
        assert_eq!(lengths, [0, 1, 3, 3]);
    }

    #[test]
    fn unseeded_exclusive_keeps_first_slot() {
        let scanner = Scanner::new(SerialExecutor::default(), HostAllocator, small_grid());
        let input: Vec<i64> = (1..=30).collect();
        let mut output = vec![-1; 30];
        let op = ScanOp::exclusive(add, 0).without_seed();
        scanner.scan(&input, &mut output, &op).unwrap();

        assert_eq!(output[0], -1);
        let expected = crate::reference::exclusive_scan(&input, add, |x| x, 0);
        assert_eq!(&output[1..], &expected[1..]);
    }

    #[test]
    fn unseeded_exclusive_with_single_element_blocks() {
        let scanner = Scanner::new(
            SerialExecutor::default(),
            HostAllocator,
            GridConfig::new(1, 1, 1).unwrap(),
        );
        let mut data = [3i64, 4, 5, 6];
        scanner
            .scan_in_place(&mut data, &ScanOp::exclusive(add, 0).without_seed())
            .unwrap();
        assert_eq!(data, [3, 3, 7, 12]);
    }

    #[test]
    fn scratch_exhaustion_aborts() {
        let scanner = Scanner::new(RayonExecutor::new(), BudgetAllocator::new(8), small_grid());
        let input = vec![1i64; 100];
        let mut output = vec![0i64; 100];
        let err = scanner
            .scan(&input, &mut output, &ScanOp::inclusive(add))
            .unwrap_err();
        assert!(matches!(err, ScanError::ScratchAllocation { .. }));
    }

    #[test]
    fn group_order_does_not_matter() {
        let grid = GridConfig::new(4, 2, 5).unwrap();
        let input: Vec<i64> = (0..317).map(|i| (i * 7919) % 101 - 50).collect();
        let op = ScanOp::inclusive(add).with_seed(3);
        let expected = crate::reference::inclusive_scan(&input, add, |x| x, Some(3));

        for order in [GroupOrder::Forward, GroupOrder::Reverse, GroupOrder::Shuffled(11)] {
            let scanner = Scanner::new(SerialExecutor::new(order), HostAllocator, grid);
            let mut output = vec![0; input.len()];
            scanner.scan(&input, &mut output, &op).unwrap();
            assert_eq!(output, expected, "{order:?}");
        }
    }
}
