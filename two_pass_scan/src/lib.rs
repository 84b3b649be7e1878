//! Parallel prefix scans over a grid of lane groups that has no global
//! barrier.
//!
//! A scan is split into blocks that run one after another. Each block takes
//! two kernel dispatches: a local reduce that leaves one total per group, and
//! a carry-apply pass that resolves every group's carry-in from those totals
//! and writes the final values. The last value of a block seeds the next one.
//!
//! ```
//! let input = [1, 2, 3, 4, 5, 6, 7, 8];
//! let mut output = [0; 8];
//! two_pass_scan::inclusive_scan(&input, &mut output, |a, b| a + b).unwrap();
//! assert_eq!(output, [1, 3, 6, 10, 15, 21, 28, 36]);
//! ```

pub mod alloc;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod reference;
pub mod scan;

pub use alloc::{BudgetAllocator, CarryAllocator, CarryStorage, HostAllocator};
pub use config::GridConfig;
pub use dispatch::{BlockDispatcher, DispatchState};
pub use error::ScanError;
pub use executor::{Event, Executor, GroupOrder, RayonExecutor, SerialExecutor};
pub use kernel_tools::{BlockShape, ScanMode};
pub use scan::{
    exclusive_scan, inclusive_scan, transform_exclusive_scan, transform_inclusive_scan, ScanOp,
    Scanner,
};
