use crate::{
    grid::{BlockShape, GroupId, Kernel, ScanMode},
    kogge_stone::Ladder,
    mem::GlobalMem,
};

/// Second pass over a block: resolve each group's carry-in, then rescan the
/// group's elements with it and write the final values.
///
/// The first pass must have completed for every group of the block, since the
/// carry-in of group `g` depends on the totals of all groups before it. No
/// group waits on another inside this kernel; the totals are only read.
///
/// `block_carry` is the combined value of everything before the block: the
/// seed for the first block, the chained carry for later ones, or `None` when
/// nothing precedes the block at all.
pub struct CarryApplyKernel<'a, I, T, C, U> {
    input: GlobalMem<'a, I>,
    output: GlobalMem<'a, T>,

    /// Group totals from the first pass. Read only.
    carries: GlobalMem<'a, Option<T>>,

    /// Slot `g` receives the resolved carry-in of group `g`.
    resolved: GlobalMem<'a, Option<T>>,

    shape: BlockShape,
    mode: ScanMode,
    block_carry: Option<T>,
    combine: &'a C,
    transform: &'a U,
}

impl<'a, I, T, C, U> CarryApplyKernel<'a, I, T, C, U>
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
    /// Panics if the block does not fit in `input` or `output`, if `output` or
    /// `resolved` is read only, if `carries` or `resolved` has fewer than
    /// `shape.groups` slots, or if the lane width is not a power of two.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        input: GlobalMem<'a, I>,
        output: GlobalMem<'a, T>,
        carries: GlobalMem<'a, Option<T>>,
        resolved: GlobalMem<'a, Option<T>>,
        shape: BlockShape,
        mode: ScanMode,
        block_carry: Option<T>,
        combine: &'a C,
        transform: &'a U,
    ) -> Self {
        assert!(
            shape.lane_width.is_power_of_two(),
            "lane width {} is not a power of two",
            shape.lane_width
        );
        let end = shape.start.checked_add(shape.len);
        assert!(
            end.map_or(false, |end| end <= input.len() && end <= output.len()),
            "block {}..+{} exceeds input of {} or output of {}",
            shape.start,
            shape.len,
            input.len(),
            output.len()
        );
        assert!(output.is_writable(), "output is read only");
        assert!(resolved.is_writable(), "resolved slots are read only");
        assert!(
            carries.len() >= shape.groups && resolved.len() >= shape.groups,
            "{} carry slots and {} resolved slots for {} groups",
            carries.len(),
            resolved.len(),
            shape.groups
        );

        Self {
            input,
            output,
            carries,
            resolved,
            shape,
            mode,
            block_carry,
            combine,
            transform,
        }
    }

    /// The combined value of everything that precedes group `g`.
    ///
    /// The totals of groups `0..g` are ladder-scanned in chunks of one lane
    /// width, threading the running total from chunk to chunk with the block
    /// carry as the initial carry-in. This is the row walk of the first pass,
    /// one level up.
    fn resolve_carry_in(&self, g: usize) -> Option<T> {
        let width = self.shape.lane_width;
        let ladder = Ladder::new(width);
        let mut lanes = Vec::with_capacity(width);
        let mut carry = self.block_carry;

        for chunk in (0..g).step_by(width) {
            let chunk_end = (chunk + width).min(g);
            lanes.clear();
            lanes.extend((chunk..chunk_end).filter_map(|i| unsafe { self.carries.read(i) }));
            carry = ladder.inclusive(&mut lanes, carry, self.combine);
        }

        carry
    }

    /// Rescans the rows of group `g` starting from `carry_in` and writes them
    /// to the output.
    ///
    /// Every row is loaded in full before any of it is stored, so the input
    /// and output may be the same buffer.
    fn apply(&self, g: usize, carry_in: Option<T>) {
        let ladder = Ladder::new(self.shape.lane_width);
        let mut lanes = Vec::with_capacity(self.shape.lane_width);
        let mut carry = carry_in;

        for row in self.shape.rows(g) {
            lanes.clear();
            lanes.extend(row.clone().map(|i| (self.transform)(unsafe { self.input.read(i) })));

            let incoming = carry;
            carry = match self.mode {
                ScanMode::Inclusive => ladder.inclusive(&mut lanes, incoming, self.combine),
                ScanMode::Exclusive => ladder.exclusive(&mut lanes, incoming, self.combine),
            };

            // Without a carry-in, lane 0 of an exclusive row has no value. That
            // only happens for the first element of an unseeded exclusive scan.
            let skip = usize::from(self.mode == ScanMode::Exclusive && incoming.is_none());
            for (i, value) in row.zip(lanes.iter()).skip(skip) {
                unsafe {
                    self.output.write(i, *value);
                }
            }
        }
    }
}

impl<'a, I, T, C, U> Kernel for CarryApplyKernel<'a, I, T, C, U>
where
    I: Copy + Send + Sync,
    T: Copy + Send + Sync,
    C: Fn(T, T) -> T + Sync,
    U: Fn(I) -> T + Sync,
{
    const NAME: &'static str = "carry_apply";

    unsafe fn run_group(&self, group: GroupId) {
        let g = group.0;
        debug_assert!(g < self.shape.groups, "group {} of {}", g, self.shape.groups);
        let carry_in = self.resolve_carry_in(g);
        unsafe {
            self.resolved.write(g, carry_in);
        }
        self.apply(g, carry_in);
    }
}
