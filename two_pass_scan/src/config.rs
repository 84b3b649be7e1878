use crate::error::ScanError;
use kernel_tools::BlockShape;

/// Default number of lanes per group: the SIMD width of the hardware the
/// kernels were tuned for.
pub const DEFAULT_LANE_WIDTH: usize = 32;

/// Default number of elements each lane walks in a full block.
pub const DEFAULT_ELEMENTS_PER_LANE: usize = 16;

/// Default number of groups per block.
pub const DEFAULT_GROUPS_PER_BLOCK: usize = 64;

/// Launch geometry of a scan.
///
/// A full block holds `lane_width * elements_per_lane * groups_per_block`
/// elements. `lane_width` and `lane_width * elements_per_lane` must be powers
/// of two so every ladder scan is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridConfig {
    lane_width: usize,
    elements_per_lane: usize,
    groups_per_block: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            lane_width: DEFAULT_LANE_WIDTH,
            elements_per_lane: DEFAULT_ELEMENTS_PER_LANE,
            groups_per_block: DEFAULT_GROUPS_PER_BLOCK,
        }
    }
}

impl GridConfig {
    pub fn new(
        lane_width: usize,
        elements_per_lane: usize,
        groups_per_block: usize,
    ) -> Result<Self, ScanError> {
        let config = Self {
            lane_width,
            elements_per_lane,
            groups_per_block,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_lane_width(self, lane_width: usize) -> Result<Self, ScanError> {
        Self::new(lane_width, self.elements_per_lane, self.groups_per_block)
    }

    pub fn with_elements_per_lane(self, elements_per_lane: usize) -> Result<Self, ScanError> {
        Self::new(self.lane_width, elements_per_lane, self.groups_per_block)
    }

    pub fn with_groups_per_block(self, groups_per_block: usize) -> Result<Self, ScanError> {
        Self::new(self.lane_width, self.elements_per_lane, groups_per_block)
    }

    fn validate(&self) -> Result<(), ScanError> {
        if self.lane_width == 0 || self.elements_per_lane == 0 || self.groups_per_block == 0 {
            return Err(ScanError::InvalidGrid(format!(
                "every dimension must be non-zero, got {:?}",
                self
            )));
        }
        if !self.lane_width.is_power_of_two() {
            return Err(ScanError::InvalidGrid(format!(
                "lane width {} is not a power of two",
                self.lane_width
            )));
        }
        let span = self
            .lane_width
            .checked_mul(self.elements_per_lane)
            .filter(|span| span.is_power_of_two())
            .ok_or_else(|| {
                ScanError::InvalidGrid(format!(
                    "group span {} x {} is not a power of two",
                    self.lane_width, self.elements_per_lane
                ))
            })?;
        if span.checked_mul(self.groups_per_block).is_none() {
            return Err(ScanError::InvalidGrid(format!(
                "block of {} groups of {} elements overflows",
                self.groups_per_block, span
            )));
        }
        Ok(())
    }

    pub fn lane_width(&self) -> usize {
        self.lane_width
    }

    pub fn elements_per_lane(&self) -> usize {
        self.elements_per_lane
    }

    pub fn groups_per_block(&self) -> usize {
        self.groups_per_block
    }

    /// Number of elements a full group covers.
    pub fn group_span(&self) -> usize {
        self.lane_width * self.elements_per_lane
    }

    /// Number of elements in a full block.
    pub fn block_size(&self) -> usize {
        self.group_span() * self.groups_per_block
    }

    /// Number of chained blocks needed for `len` elements.
    pub fn block_count(&self, len: usize) -> usize {
        len.div_ceil(self.block_size())
    }

    /// Shape of block `index`, which starts at `start` with `remaining`
    /// elements left in the sequence.
    ///
    /// A full block uses the configured elements per lane. A shorter final
    /// block uses the smallest power-of-two elements per lane that still fits
    /// it in `groups_per_block` groups, so a small input is spread across
    /// groups instead of piling into the first few.
    pub fn block_shape(&self, index: usize, start: usize, remaining: usize) -> BlockShape {
        let len = remaining.min(self.block_size());
        let mut elements_per_lane = self.elements_per_lane;

        if len < self.block_size() {
            elements_per_lane = 1;
            while len.div_ceil(self.lane_width * elements_per_lane) > self.groups_per_block {
                elements_per_lane *= 2;
            }
        }

        BlockShape {
            index,
            start,
            len,
            lane_width: self.lane_width,
            elements_per_lane,
            groups: len.div_ceil(self.lane_width * elements_per_lane),
        }
    }
}
