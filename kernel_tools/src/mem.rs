use std::marker::PhantomData;

/// A view of a host buffer as kernels see global memory: a base pointer and a
/// length, shared by every group of a dispatch.
///
/// Groups never hold references into the buffer; they read and write single
/// elements by index. The caller of [`GlobalMem::write`] guarantees that no two
/// groups touch the same index during one dispatch, which is how the scan
/// partitions its output and carry slots. An input view and an output view may
/// point at the same buffer (in-place scans) as long as every group reads an
/// index before it overwrites it.
pub struct GlobalMem<'a, T> {
    elements: *mut T,
    len: usize,
    writable: bool,
    _marker: PhantomData<&'a mut [T]>,
}

// Safety: access is by copy through raw pointers; disjointness of writes is a
// precondition of `write`.
unsafe impl<T: Send> Send for GlobalMem<'_, T> {}
unsafe impl<T: Send + Sync> Sync for GlobalMem<'_, T> {}

impl<T> Clone for GlobalMem<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for GlobalMem<'_, T> {}

impl<'a, T> GlobalMem<'a, T>
where
    T: Copy,
{
    /// A writable view over `slice`.
    pub fn new(slice: &'a mut [T]) -> Self {
        Self {
            elements: slice.as_mut_ptr(),
            len: slice.len(),
            writable: true,
            _marker: PhantomData,
        }
    }

    /// A view over `slice` that may only be read.
    pub fn read_only(slice: &'a [T]) -> Self {
        Self {
            elements: slice.as_ptr() as *mut T,
            len: slice.len(),
            writable: false,
            _marker: PhantomData,
        }
    }

    /// A read-only alias of this view. Used for in-place scans, where the
    /// kernel input and output are the same buffer.
    pub fn as_read_only(&self) -> Self {
        Self {
            writable: false,
            ..*self
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Reads the element at `idx`.
    ///
    /// # Safety
    ///
    /// `idx` must be in bounds and no other group may be writing `idx`
    /// concurrently.
    pub unsafe fn read(&self, idx: usize) -> T {
        debug_assert!(idx < self.len, "read at {} of {}", idx, self.len);
        *self.elements.add(idx)
    }

    /// Writes `val` at `idx`.
    ///
    /// # Safety
    ///
    /// The view must be writable, `idx` must be in bounds, and no other group
    /// may read or write `idx` concurrently.
    pub unsafe fn write(&self, idx: usize, val: T) {
        debug_assert!(self.writable, "write through a read-only view");
        debug_assert!(idx < self.len, "write at {} of {}", idx, self.len);
        *(&mut *self.elements.add(idx)) = val;
    }
}
