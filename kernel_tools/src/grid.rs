use std::ops::Range;

/// Index of a group within one kernel dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub usize);

/// The launch shape of one dispatch: how many groups run, and how many lanes
/// each group has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub groups: usize,
    pub lane_width: usize,
}

/// A kernel body. The executor calls `run_group` exactly once per group of
/// the grid, in any order and possibly concurrently.
pub trait Kernel: Sync {
    /// Name used when the dispatch is logged.
    const NAME: &'static str;

    /// Runs every lane of `group`.
    ///
    /// # Safety
    ///
    /// `group` must be below the group count the kernel was built for, and
    /// each group may run at most once per dispatch. While the dispatch runs,
    /// the buffers behind the kernel's views must not be read or written by
    /// anything other than the kernel, and no two views may alias except an
    /// output and its own read-only input.
    unsafe fn run_group(&self, group: GroupId);
}

/// Whether the element at position `i` is part of its own prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Inclusive,
    Exclusive,
}

/// Placement of one block of the input and the per-block launch parameters.
///
/// Group `g` covers `lane_width * elements_per_lane` consecutive elements
/// starting at `start + g * lane_width * elements_per_lane`, clipped to the
/// block. Within a group the elements are walked as rows of `lane_width`, so
/// lane `l` owns elements `l`, `l + lane_width`, `l + 2 * lane_width`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockShape {
    /// Position of the block in the chain.
    pub index: usize,

    /// Index of the first element of the block in the whole sequence.
    pub start: usize,

    /// Number of elements in the block.
    pub len: usize,

    pub lane_width: usize,
    pub elements_per_lane: usize,

    /// Number of groups needed to cover `len` elements.
    pub groups: usize,
}

impl BlockShape {
    /// One past the last element of the block.
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Number of elements a full group covers.
    pub fn group_span(&self) -> usize {
        self.lane_width * self.elements_per_lane
    }

    /// The elements covered by group `g`. Only the last group of a block can
    /// be shorter than `group_span`.
    pub fn group_range(&self, g: usize) -> Range<usize> {
        let start = (self.start + g * self.group_span()).min(self.end());
        let end = (start + self.group_span()).min(self.end());
        start..end
    }

    /// The rows walked by group `g`; each row is at most `lane_width` long.
    pub fn rows(&self, g: usize) -> impl Iterator<Item = Range<usize>> {
        let range = self.group_range(g);
        let width = self.lane_width;
        (range.start..range.end)
            .step_by(width)
            .map(move |row| row..(row + width).min(range.end))
    }

    /// The group that owns the last element of the block.
    pub fn last_group(&self) -> usize {
        self.groups.saturating_sub(1)
    }

    pub fn grid(&self) -> GridShape {
        GridShape {
            groups: self.groups,
            lane_width: self.lane_width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BlockShape;

    fn shape() -> BlockShape {
        BlockShape {
            index: 1,
            start: 100,
            len: 21,
            lane_width: 4,
            elements_per_lane: 2,
            groups: 3,
        }
    }

    #[test]
    fn group_ranges_clip_to_block() {
        let s = shape();
        assert_eq!(s.group_range(0), 100..108);
        assert_eq!(s.group_range(1), 108..116);
        assert_eq!(s.group_range(2), 116..121);
        assert_eq!(s.last_group(), 2);
        assert_eq!(s.end(), 121);
    }

    #[test]
    fn rows_are_lane_wide() {
        let s = shape();
        let rows: Vec<_> = s.rows(2).collect();
        assert_eq!(rows, vec![116..120, 120..121]);
        let rows: Vec<_> = s.rows(0).collect();
        assert_eq!(rows, vec![100..104, 104..108]);
    }
}
