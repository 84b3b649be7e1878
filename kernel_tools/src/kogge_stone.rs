use crate::step::ladder_shifts;

/// The lane-group prefix scan shared by both passes.
///
/// A group holds one value per lane. Each round, every lane at index `>= shift`
/// combines the value held `shift` lanes below it into its own value, with the
/// shift doubling from 1 up to `width / 2`. After `log2(width)` rounds every
/// lane holds the inclusive prefix of the group.
///
/// This is the Kogge-Stone algorithm: step-efficient rather than
/// work-efficient, which suits a group whose lanes all execute every round
/// anyway.
///
/// Groups with fewer meaningful values than lanes (the tail of a block) pass a
/// shorter slice; the missing lanes are masked out of every round, so they are
/// never combined into their neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ladder {
    width: usize,
}

impl Ladder {
    pub fn new(width: usize) -> Self {
        debug_assert!(width.is_power_of_two(), "lane width {width}");
        Self { width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of combine rounds per scan.
    pub fn rounds(&self) -> u32 {
        self.width.trailing_zeros()
    }

    /// In-place inclusive scan of `lanes`, combined on the left with `carry`.
    ///
    /// `lanes.len()` is the number of active lanes and must not exceed the
    /// width. Returns the value of the last active lane, which is the running
    /// total to carry into the next row, or `carry` unchanged when no lane is
    /// active.
    pub fn inclusive<T, F>(&self, lanes: &mut [T], carry: Option<T>, combine: &F) -> Option<T>
    where
        T: Copy,
        F: Fn(T, T) -> T,
    {
        let active = lanes.len();
        debug_assert!(active <= self.width);
        if active == 0 {
            return carry;
        }

        if let Some(carry) = carry {
            lanes[0] = combine(carry, lanes[0]);
        }

        for shift in ladder_shifts(self.width) {
            // Descending so that every lane reads its neighbour's value from
            // the previous round, as a shift-exchange would deliver it.
            for lane in (shift..active).rev() {
                lanes[lane] = combine(lanes[lane - shift], lanes[lane]);
            }
        }

        Some(lanes[active - 1])
    }

    /// In-place exclusive scan of `lanes`, combined on the left with `carry`.
    ///
    /// Every lane takes the inclusive value of the lane below it and lane 0
    /// takes `carry`. When `carry` is `None` there is nothing preceding lane 0
    /// and its slot holds no meaningful value; the caller must not store it.
    /// Returns the inclusive total, as [`Ladder::inclusive`] does.
    pub fn exclusive<T, F>(&self, lanes: &mut [T], carry: Option<T>, combine: &F) -> Option<T>
    where
        T: Copy,
        F: Fn(T, T) -> T,
    {
        let total = self.inclusive(lanes, carry, combine);

        for lane in (1..lanes.len()).rev() {
            lanes[lane] = lanes[lane - 1];
        }
        if let (Some(carry), Some(first)) = (carry, lanes.first_mut()) {
            *first = carry;
        }

        total
    }
}
