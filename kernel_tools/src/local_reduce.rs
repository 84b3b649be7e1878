use crate::{
    grid::{BlockShape, GroupId, Kernel},
    kogge_stone::Ladder,
    mem::GlobalMem,
};

/// First pass over a block: every group reduces its own elements to a single
/// total.
///
/// Group `g` walks its rows, transforms each element, and ladder-scans the row
/// with the running total of the previous rows as carry-in. The last lane's
/// value after the final row is the group total, which goes to carry slot `g`.
/// Nothing is written to the output.
///
/// When `cache_tail` is set, the group owning the last element of the block
/// also stores that element, transformed, in slot `shape.groups`. An exclusive
/// scan needs it to chain the next block, and an in-place exclusive scan
/// overwrites it in the second pass.
pub struct LocalReduceKernel<'a, I, T, C, U> {
    input: GlobalMem<'a, I>,
    carries: GlobalMem<'a, Option<T>>,
    shape: BlockShape,
    cache_tail: bool,
    combine: &'a C,
    transform: &'a U,
}

impl<'a, I, T, C, U> LocalReduceKernel<'a, I, T, C, U>
where
    I: Copy,
    T: Copy,
    C: Fn(T, T) -> T,
    U: Fn(I) -> T,
{
    /// Builds the kernel for one block.
    ///
    /// # Panics
    ///
    /// Panics if the block does not fit in `input`, if `carries` is read only
    /// or has fewer than `shape.groups` slots (`shape.groups + 1` with
    /// `cache_tail`), or if the lane width is not a power of two.
    pub fn new(
        input: GlobalMem<'a, I>,
        carries: GlobalMem<'a, Option<T>>,
        shape: BlockShape,
        cache_tail: bool,
        combine: &'a C,
        transform: &'a U,
    ) -> Self {
        assert!(
            shape.lane_width.is_power_of_two(),
            "lane width {} is not a power of two",
            shape.lane_width
        );
        assert!(
            shape.start.checked_add(shape.len).map_or(false, |end| end <= input.len()),
            "block {}..+{} exceeds input of {}",
            shape.start,
            shape.len,
            input.len()
        );
        let slots = shape.groups.saturating_add(usize::from(cache_tail));
        assert!(carries.is_writable(), "carry slots are read only");
        assert!(carries.len() >= slots, "{} carry slots for {} needed", carries.len(), slots);

        Self {
            input,
            carries,
            shape,
            cache_tail,
            combine,
            transform,
        }
    }

    /// Reduces the elements of group `g`, returning `None` for a group with
    /// no elements.
    fn group_total(&self, g: usize) -> Option<T> {
        let ladder = Ladder::new(self.shape.lane_width);
        let mut lanes = Vec::with_capacity(self.shape.lane_width);
        let mut carry = None;

        for row in self.shape.rows(g) {
            lanes.clear();
            lanes.extend(row.map(|i| (self.transform)(unsafe { self.input.read(i) })));
            carry = ladder.inclusive(&mut lanes, carry, self.combine);
        }

        carry
    }
}

impl<'a, I, T, C, U> Kernel for LocalReduceKernel<'a, I, T, C, U>
where
    I: Copy + Send + Sync,
    T: Copy + Send + Sync,
    C: Fn(T, T) -> T + Sync,
    U: Fn(I) -> T + Sync,
{
    const NAME: &'static str = "local_reduce";

    unsafe fn run_group(&self, group: GroupId) {
        let g = group.0;
        debug_assert!(g < self.shape.groups, "group {} of {}", g, self.shape.groups);
        let total = self.group_total(g);

        // Each group owns slot `g`; only the last group touches the tail slot.
        unsafe {
            self.carries.write(g, total);
        }

        if self.cache_tail && g == self.shape.last_group() && self.shape.len > 0 {
            let last = unsafe { self.input.read(self.shape.end() - 1) };
            unsafe {
                self.carries.write(self.shape.groups, Some((self.transform)(last)));
            }
        }
    }
}
