use crate::error::ScanError;
use kernel_tools::GlobalMem;
use std::mem::size_of;
use tracing::warn;

/// Scratch space for the carries of one block.
///
/// `carries` has one slot per group plus one: slot `g` receives the total of
/// group `g` in the local reduce pass, and the extra slot caches the block's
/// last input element for exclusive scans. `resolved` receives each group's
/// carry-in during the carry-apply pass. The two live in separate arrays so
/// the second pass can read every total while groups record their own
/// carry-in.
///
/// No result is computed from `resolved`. It is a record of the last block's
/// carry-ins, which the dispatcher checks in debug builds.
#[derive(Debug)]
pub struct CarryStorage<T> {
    carries: Vec<Option<T>>,
    resolved: Vec<Option<T>>,
}

impl<T> CarryStorage<T>
where
    T: Copy,
{
    /// Number of groups the storage can serve.
    pub fn groups(&self) -> usize {
        self.resolved.len()
    }

    /// Group totals from the last local reduce pass.
    pub fn totals(&self) -> &[Option<T>] {
        &self.carries[..self.groups()]
    }

    /// The cached last element of the last block, if one was cached.
    pub fn tail(&self) -> Option<T> {
        self.carries[self.groups()]
    }

    /// Carry-ins resolved by the last carry-apply pass.
    pub fn resolved(&self) -> &[Option<T>] {
        &self.resolved
    }

    /// Clears every slot before a block is dispatched.
    pub(crate) fn reset(&mut self) {
        self.carries.iter_mut().for_each(|slot| *slot = None);
        self.resolved.iter_mut().for_each(|slot| *slot = None);
    }

    /// Kernel views of the storage, sized for a block of `groups` groups. The
    /// tail slot is always the one right after the last group's total.
    pub(crate) fn views(&mut self, groups: usize) -> (GlobalMem<'_, Option<T>>, GlobalMem<'_, Option<T>>) {
        debug_assert!(groups <= self.groups());
        let tail = self.groups();
        self.carries.swap(groups, tail);
        (
            GlobalMem::new(&mut self.carries[..=groups]),
            GlobalMem::new(&mut self.resolved[..groups]),
        )
    }

    /// Moves the tail slot of a block of `groups` groups back to the end
    /// after the block has completed.
    pub(crate) fn settle(&mut self, groups: usize) {
        let tail = self.groups();
        self.carries.swap(groups, tail);
    }

    /// Bytes needed for `groups` groups.
    pub fn bytes_for(groups: usize) -> usize {
        (2 * groups + 1) * size_of::<Option<T>>()
    }
}

/// Provides the carry storage for a scan call.
pub trait CarryAllocator {
    fn allocate<T: Copy>(&self, groups: usize) -> Result<CarryStorage<T>, ScanError>;
}

/// Allocates carry storage on the heap, reporting allocation failure instead
/// of aborting.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostAllocator;

impl CarryAllocator for HostAllocator {
    fn allocate<T: Copy>(&self, groups: usize) -> Result<CarryStorage<T>, ScanError> {
        let failed = || ScanError::ScratchAllocation {
            slots: 2 * groups + 1,
            bytes: CarryStorage::<T>::bytes_for(groups),
        };
        let slots = groups.checked_add(1).ok_or_else(failed)?;

        let mut carries = Vec::new();
        carries.try_reserve_exact(slots).map_err(|err| {
            warn!(%err, slots, "carry storage allocation failed");
            failed()
        })?;
        let mut resolved = Vec::new();
        resolved.try_reserve_exact(groups).map_err(|err| {
            warn!(%err, groups, "carry storage allocation failed");
            failed()
        })?;

        carries.resize(slots, None);
        resolved.resize(groups, None);
        Ok(CarryStorage { carries, resolved })
    }
}

/// Refuses any carry storage larger than a fixed number of bytes.
#[derive(Debug, Clone, Copy)]
pub struct BudgetAllocator {
    max_bytes: usize,
}

impl BudgetAllocator {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl CarryAllocator for BudgetAllocator {
    fn allocate<T: Copy>(&self, groups: usize) -> Result<CarryStorage<T>, ScanError> {
        let bytes = CarryStorage::<T>::bytes_for(groups);
        if bytes > self.max_bytes {
            warn!(bytes, max_bytes = self.max_bytes, "carry storage over budget");
            return Err(ScanError::ScratchAllocation {
                slots: 2 * groups + 1,
                bytes,
            });
        }
        HostAllocator.allocate(groups)
    }
}
