use alloc::alloc as malloc;
use core::mem;
use core::ptr::{self, NonNull};

use crate::{AllocError, Shape};

// -----------------------------------------------------------------------------
// AbortOnReleaseFail

/// A guard used to terminate the process
/// when a destructor panicked mid-release.
///
/// Unwinding out of the release loop would leave the rest of the sequence
/// undropped and the backing allocation unreachable.
struct AbortOnReleaseFail;

impl Drop for AbortOnReleaseFail {
    #[cold]
    #[inline(never)]
    fn drop(&mut self) {
        #[cfg(feature = "std")]
        {
            ::std::eprintln!("Aborting due to a destructor panicking during resource release.");
            ::std::process::abort();
        }
        #[cfg(not(feature = "std"))]
        panic!("Aborting due to a destructor panicking during resource release.");
    }
}

// -----------------------------------------------------------------------------
// RawResource

/// A heap resource: a pointer to one value or to `len` contiguous values of
/// `T`, paired with the [`Shape`] it was allocated with.
///
/// This is the lowest layer. It does not track whether it has been released
/// and dropping it does nothing; the owner types are responsible for calling
/// [`release`](Self::release) exactly once. What it does guarantee is the
/// allocation/release pairing: `release` always uses the shape recorded at
/// allocation time.
///
/// Zero-sized layouts (zero-sized `T`, or a zero-length sequence) are backed
/// by a dangling, well-aligned pointer and never touch the allocator.
#[derive(Debug)]
pub struct RawResource<T> {
    data: NonNull<T>,
    shape: Shape,
}

impl<T> RawResource<T> {
    /// The release strategy this resource was allocated with.
    #[inline(always)]
    pub const fn shape(&self) -> Shape {
        self.shape
    }

    /// Number of values in this resource (1 for a scalar).
    #[inline(always)]
    pub const fn count(&self) -> usize {
        self.shape.count()
    }

    /// The raw data pointer, without giving up ownership.
    #[inline(always)]
    pub const fn as_non_null(&self) -> NonNull<T> {
        self.data
    }

    /// Rebuilds a resource from a pointer previously handed out by an owner.
    ///
    /// # Safety
    /// - `data` must come from an allocation made by this crate's entry
    ///   points with exactly this `shape` and item type `T`.
    /// - Every value must still be initialized.
    /// - No other live `RawResource` or owner may refer to the allocation.
    #[inline(always)]
    pub const unsafe fn from_raw_parts(data: NonNull<T>, shape: Shape) -> Self {
        Self { data, shape }
    }

    /// Returns a reference to the value at `index`.
    ///
    /// # Safety
    /// - `index` must be within `0..count()`.
    /// - The value at `index` must be initialized.
    #[inline(always)]
    pub unsafe fn get(&self, index: usize) -> &T {
        // SAFETY: `index` is in bounds and the value is initialized.
        unsafe { self.data.add(index).as_ref() }
    }

    /// Returns a mutable reference to the value at `index`.
    ///
    /// # Safety
    /// - `index` must be within `0..count()`.
    /// - The value at `index` must be initialized.
    #[inline(always)]
    pub unsafe fn get_mut(&mut self, index: usize) -> &mut T {
        // SAFETY: `index` is in bounds, the value is initialized, and
        // `&mut self` gives exclusive access.
        unsafe { self.data.add(index).as_mut() }
    }

    /// All values as a slice (a scalar is a one-element slice).
    ///
    /// # Safety
    /// - Every value in `0..count()` must be initialized.
    #[inline(always)]
    pub unsafe fn as_slice(&self) -> &[T] {
        // SAFETY: the data is contiguous, initialized and lives as long as
        // `&self`.
        unsafe { core::slice::from_raw_parts(self.data.as_ptr(), self.count()) }
    }

    /// All values as a mutable slice.
    ///
    /// # Safety
    /// - Every value in `0..count()` must be initialized.
    #[inline(always)]
    pub unsafe fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as `as_slice`, with exclusivity from `&mut self`.
        unsafe { core::slice::from_raw_parts_mut(self.data.as_ptr(), self.count()) }
    }

    /// Drops every value in place, then deallocates the backing memory using
    /// the shape recorded at allocation time.
    ///
    /// If a destructor panics, the process is aborted: continuing to unwind
    /// would leave the remaining values undropped and the allocation
    /// unreachable.
    ///
    /// # Safety
    /// - Every value in `0..count()` must be initialized.
    /// - The resource must not have been released before, and the allocation
    ///   must not be accessed afterwards.
    pub unsafe fn release(self) {
        if mem::needs_drop::<T>() {
            let guard = AbortOnReleaseFail;

            // SAFETY: the values are initialized and contiguous, and the
            // caller guarantees this is the single release.
            unsafe {
                ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                    self.data.as_ptr(),
                    self.count(),
                ));
            }

            mem::forget(guard);
        }

        // SAFETY: the values are dropped; only the memory remains.
        unsafe { self.dealloc() }
    }

    /// Deallocates the backing memory without dropping any value.
    ///
    /// # Safety
    /// - All values must already be dropped (or never initialized).
    /// - The allocation must not be accessed afterwards.
    unsafe fn dealloc(self) {
        // The layout was validated when the resource was allocated.
        if let Ok(layout) = self.shape.layout::<T>()
            && layout.size() != 0
        {
            // SAFETY: `data` was allocated with exactly this layout.
            unsafe { malloc::dealloc(self.data.as_ptr().cast(), layout) }
        }
    }
}

// -----------------------------------------------------------------------------
// Allocation entry points

/// Allocates a scalar resource holding `value`.
///
/// # Examples
///
/// ```
/// use own_alloc::{Shape, alloc_scalar};
///
/// let res = alloc_scalar(42u32).unwrap();
/// assert_eq!(res.shape(), Shape::Scalar);
/// assert_eq!(unsafe { *res.get(0) }, 42);
///
/// unsafe { res.release() };
/// ```
pub fn alloc_scalar<T>(value: T) -> Result<RawResource<T>, AllocError> {
    let shape = Shape::Scalar;
    let data = alloc_for::<T>(shape)?;

    // SAFETY: `data` is valid for one `T` and currently uninitialized.
    unsafe { data.write(value) };

    Ok(RawResource { data, shape })
}

/// Allocates a sequence resource of `len` values, initialized in order by
/// `init(0)` through `init(len - 1)`.
///
/// A zero-length sequence performs no allocation. If `init` panics, the
/// already-initialized prefix is dropped and the allocation is freed before
/// the panic continues.
///
/// # Examples
///
/// ```
/// use own_alloc::{Shape, alloc_sequence_with};
///
/// let res = alloc_sequence_with(5, |i| i as u32 + 1).unwrap();
/// assert_eq!(res.shape(), Shape::Sequence { len: 5 });
/// assert_eq!(unsafe { res.as_slice() }, &[1, 2, 3, 4, 5]);
///
/// unsafe { res.release() };
/// ```
pub fn alloc_sequence_with<T>(
    len: usize,
    mut init: impl FnMut(usize) -> T,
) -> Result<RawResource<T>, AllocError> {
    let shape = Shape::Sequence { len };
    let data = alloc_for::<T>(shape)?;

    let mut partial = PartialSequence { data, shape, filled: 0 };
    while partial.filled < len {
        // SAFETY: `filled < len`, so the slot is in bounds and uninitialized.
        unsafe { partial.data.add(partial.filled).write(init(partial.filled)) };
        partial.filled += 1;
    }
    mem::forget(partial);

    Ok(RawResource { data, shape })
}

/// Cleans up a half-initialized sequence when `init` panics.
struct PartialSequence<T> {
    data: NonNull<T>,
    shape: Shape,
    filled: usize,
}

impl<T> Drop for PartialSequence<T> {
    fn drop(&mut self) {
        // SAFETY: exactly `filled` values are initialized, and the resource
        // never escaped, so this is the only cleanup path.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.data.as_ptr(), self.filled));
            RawResource { data: self.data, shape: self.shape }.dealloc();
        }
    }
}

/// Grabs uninitialized backing memory for `shape`, or a dangling pointer for
/// zero-sized layouts.
fn alloc_for<T>(shape: Shape) -> Result<NonNull<T>, AllocError> {
    let layout = shape.layout::<T>()?;

    if layout.size() == 0 {
        return Ok(NonNull::dangling());
    }

    // SAFETY: `layout` has non-zero size.
    match NonNull::new(unsafe { malloc::alloc(layout) }) {
        Some(data) => Ok(data.cast()),
        None => {
            log::error!(
                "backing allocation of {} bytes (align {}) failed",
                layout.size(),
                layout.align(),
            );
            Err(AllocError::Exhausted { size: layout.size(), align: layout.align() })
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::{RawResource, alloc_scalar, alloc_sequence_with};
    use crate::Shape;

    struct Probe<'a>(&'a AtomicUsize);

    impl Drop for Probe<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn scalar_round_trip() {
        let mut res = alloc_scalar(41u64).unwrap();
        assert_eq!(res.count(), 1);

        // SAFETY: index 0 of a scalar resource is initialized.
        unsafe {
            *res.get_mut(0) += 1;
            assert_eq!(*res.get(0), 42);
            res.release();
        }
    }

    #[test]
    fn sequence_round_trip() {
        let res = alloc_sequence_with(5, |i| i as u32 * 10).unwrap();
        assert_eq!(res.shape(), Shape::Sequence { len: 5 });

        // SAFETY: all 5 values were initialized.
        unsafe {
            assert_eq!(res.as_slice(), &[0, 10, 20, 30, 40]);
            res.release();
        }
    }

    #[test]
    fn release_drops_every_value() {
        let drops = AtomicUsize::new(0);

        let res = alloc_sequence_with(4, |_| Probe(&drops)).unwrap();
        assert_eq!(drops.load(Ordering::Relaxed), 0);

        // SAFETY: all 4 values are initialized; released once.
        unsafe { res.release() };
        assert_eq!(drops.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn zero_len_and_zst() {
        let res: RawResource<u32> = alloc_sequence_with(0, |_| unreachable!()).unwrap();
        assert_eq!(res.count(), 0);
        // SAFETY: nothing to drop, nothing allocated.
        unsafe { res.release() };

        // A zero-sized type still needs its drops to run.
        static ZST_DROPS: AtomicUsize = AtomicUsize::new(0);
        struct ZstProbe;
        impl Drop for ZstProbe {
            fn drop(&mut self) {
                ZST_DROPS.fetch_add(1, Ordering::Relaxed);
            }
        }
        assert_eq!(size_of::<ZstProbe>(), 0);

        let res = alloc_sequence_with(3, |_| ZstProbe).unwrap();
        // SAFETY: all values initialized; released once.
        unsafe { res.release() };
        assert_eq!(ZST_DROPS.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn raw_parts_round_trip() {
        let res = alloc_scalar(7u8).unwrap();
        let shape = res.shape();
        let data = res.as_non_null();
        let _ = res;

        // SAFETY: same pointer, same shape, still initialized, sole owner.
        let rebuilt = unsafe { RawResource::from_raw_parts(data, shape) };
        unsafe {
            assert_eq!(*rebuilt.get(0), 7);
            rebuilt.release();
        }
    }

    #[cfg(feature = "std")]
    #[test]
    fn partial_init_drops_prefix() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct StaticProbe;
        impl Drop for StaticProbe {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::Relaxed);
            }
        }

        let result = std::panic::catch_unwind(|| {
            let _ = alloc_sequence_with(5, |i| {
                if i == 3 {
                    panic!("init failed");
                }
                StaticProbe
            });
        });

        assert!(result.is_err());
        assert_eq!(DROPS.load(Ordering::Relaxed), 3);
    }
}
