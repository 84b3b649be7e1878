//! Kernel-side building blocks for the two-pass scan.
//!
//! Everything in this crate runs "on the device": one call to
//! [`Kernel::run_group`] is one group of lanes executing a kernel body. The
//! host crate decides how groups are scheduled; kernels never synchronize
//! across groups and only communicate through [`GlobalMem`] buffers.

pub mod carry_apply;
pub mod grid;
pub mod kogge_stone;
pub mod local_reduce;
pub mod mem;
mod step;

pub use carry_apply::CarryApplyKernel;
pub use grid::{BlockShape, GridShape, GroupId, Kernel, ScanMode};
pub use kogge_stone::Ladder;
pub use local_reduce::LocalReduceKernel;
pub use mem::GlobalMem;
