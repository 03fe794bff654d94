use alloc::alloc as malloc;
use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering, fence};

use own_alloc::{AllocError, RawResource, alloc_scalar, alloc_sequence_with};

use crate::{AccessError, Exclusive};

// -----------------------------------------------------------------------------
// ControlBlock

/// Shared bookkeeping for one resource: the live-owner count plus the
/// resource itself, which carries its release strategy.
///
/// The block lives as long as the longest-lived owner referencing it. The
/// owner that observes the strong count's 1 -> 0 transition releases the
/// resource and then the block.
struct ControlBlock<T> {
    strong: AtomicUsize,
    resource: RawResource<T>,
}

/// Strong counts beyond this are only reachable by leaking clones in a
/// loop; abort before the counter can wrap.
const MAX_STRONG: usize = isize::MAX as usize;

#[cold]
#[inline(never)]
fn strong_overflow() -> ! {
    #[cfg(feature = "std")]
    ::std::process::abort();
    #[cfg(not(feature = "std"))]
    panic!("strong count overflow");
}

/// Releases the resource through the block's strategy, then frees the block.
///
/// # Safety
/// - No owner may reference `block` anymore (the strong count reached 0).
unsafe fn release_block<T>(block: NonNull<ControlBlock<T>>) {
    // SAFETY: this is the last reference; the block was allocated with this
    // exact layout and the resource is initialized and unreleased.
    unsafe {
        let ControlBlock { resource, .. } = block.read();
        resource.release();
        malloc::dealloc(block.as_ptr().cast(), Layout::new::<ControlBlock<T>>());
    }
}

// -----------------------------------------------------------------------------
// Shared

/// A shared owner of a heap resource.
///
/// Any number of `Shared` owners may reference the same resource through one
/// control block. Cloning increments the strong count before the new owner
/// becomes observable; dropping or [`reset`](Self::reset) decrements it, and
/// the owner that takes the count to zero releases the resource, exactly
/// once, through the strategy it was allocated with.
///
/// The decrement and the zero test are a single atomic operation, so owners
/// on different threads cannot race two releases out of one final drop.
/// Access through `Shared` is read-only; shared mutation is out of scope.
///
/// # Examples
///
/// ```
/// use own_ptr::Shared;
///
/// let a = Shared::from_slice(&[1, 2, 3, 4, 5]).unwrap();
/// let b = a.clone();
/// assert_eq!(a.use_count(), 2);
///
/// assert_eq!(b.get(2).copied().unwrap(), 3);
///
/// drop(b);
/// assert_eq!(a.use_count(), 1);
/// ```
pub struct Shared<T> {
    block: Option<NonNull<ControlBlock<T>>>,
}

// SAFETY: the final owner may drop the values on any thread (`T: Send`), and
// every owner can reach `&T` concurrently (`T: Sync`).
unsafe impl<T: Send + Sync> Send for Shared<T> {}

// SAFETY: as above; `&Shared<T>` exposes only `&T` and the atomic count.
unsafe impl<T: Send + Sync> Sync for Shared<T> {}

// -----------------------------------------------------------------------------
// Construction

impl<T> Shared<T> {
    /// Creates an owner holding nothing.
    #[inline(always)]
    pub const fn empty() -> Self {
        Self { block: None }
    }

    /// Allocates a scalar resource holding `value`, owned by a fresh control
    /// block with a strong count of 1.
    pub fn scalar(value: T) -> Result<Self, AllocError> {
        Self::from_resource(alloc_scalar(value)?)
    }

    /// Allocates a sequence of `len` values, initialized in order by
    /// `init(i)`, under a fresh control block.
    pub fn sequence_with(len: usize, init: impl FnMut(usize) -> T) -> Result<Self, AllocError> {
        Self::from_resource(alloc_sequence_with(len, init)?)
    }

    /// Allocates a sequence cloned from `values`.
    pub fn from_slice(values: &[T]) -> Result<Self, AllocError>
    where
        T: Clone,
    {
        Self::sequence_with(values.len(), |i| values[i].clone())
    }

    /// Wraps an already-allocated resource in a fresh control block.
    ///
    /// On block-allocation failure the resource is released before the error
    /// is returned, so no partial owner and no leak can result.
    fn from_resource(resource: RawResource<T>) -> Result<Self, AllocError> {
        let layout = Layout::new::<ControlBlock<T>>();

        // SAFETY: a control block always has non-zero size.
        let Some(block) = NonNull::new(unsafe { malloc::alloc(layout) }.cast::<ControlBlock<T>>())
        else {
            log::error!(
                "control block allocation of {} bytes (align {}) failed",
                layout.size(),
                layout.align(),
            );
            // SAFETY: the resource is initialized and has no other owner.
            unsafe { resource.release() };
            return Err(AllocError::Exhausted { size: layout.size(), align: layout.align() });
        };

        // SAFETY: `block` is valid for one `ControlBlock<T>` and uninitialized.
        unsafe {
            block.write(ControlBlock { strong: AtomicUsize::new(1), resource });
        }

        Ok(Self { block: Some(block) })
    }

    fn resource(&self) -> Option<&RawResource<T>> {
        // SAFETY: holding a strong reference keeps the block alive, and
        // shared access to the resource is read-only.
        self.block.map(|block| unsafe { &block.as_ref().resource })
    }
}

// -----------------------------------------------------------------------------
// Counting protocol

impl<T> Clone for Shared<T> {
    /// Duplicates the owner. The strong count is incremented before the new
    /// owner becomes observable; duplication of an empty owner shares the
    /// emptiness.
    fn clone(&self) -> Self {
        if let Some(block) = self.block {
            // SAFETY: `self` holds a strong reference, keeping `block` alive.
            let strong = unsafe { &block.as_ref().strong };
            if strong.fetch_add(1, Ordering::Relaxed) > MAX_STRONG {
                strong_overflow();
            }
        }

        Self { block: self.block }
    }
}

impl<T> Shared<T> {
    /// Current number of live owners of the resource (0 for an empty owner).
    ///
    /// In the presence of other threads the value is already stale when it
    /// returns; it is exact in single-threaded use.
    pub fn use_count(&self) -> usize {
        match self.block {
            // SAFETY: `self` holds a strong reference, keeping the block alive.
            Some(block) => unsafe { block.as_ref() }.strong.load(Ordering::Acquire),
            None => 0,
        }
    }

    /// Gives up this owner's share of the resource. A no-op on an empty
    /// owner.
    ///
    /// If this was the last owner, the resource is released and the control
    /// block freed. To point at a new resource instead, assign a new owner;
    /// the old share is given up when the previous value is dropped.
    pub fn reset(&mut self) {
        if let Some(block) = self.block.take() {
            Self::decrement(block);
        }
    }

    /// Drops one strong reference. The decrement and the zero check are one
    /// atomic RMW: exactly one of any set of racing final owners observes
    /// the 1 -> 0 transition and performs the release.
    fn decrement(block: NonNull<ControlBlock<T>>) {
        // SAFETY: the caller owned a strong reference, so the block is alive.
        let prev = unsafe { block.as_ref() }.strong.fetch_sub(1, Ordering::Release);

        if prev == 1 {
            // Synchronize with every other owner's final use of the resource.
            fence(Ordering::Acquire);

            // SAFETY: the count reached zero; no other reference remains.
            unsafe { release_block(block) };
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> Default for Shared<T> {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

// -----------------------------------------------------------------------------
// Access

impl<T> Shared<T> {
    /// Returns `true` if the owner holds no resource.
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.block.is_none()
    }

    /// Number of values in the shared resource (0 when empty, 1 for a
    /// scalar).
    #[inline]
    pub fn count(&self) -> usize {
        self.resource().map_or(0, RawResource::count)
    }

    /// The first shared value.
    ///
    /// Fails with [`AccessError::NullAccess`] on an empty owner, or
    /// [`AccessError::OutOfRange`] on a zero-length sequence.
    #[inline]
    pub fn try_deref(&self) -> Result<&T, AccessError> {
        self.get(0)
    }

    /// The value at `index`, bounds-checked.
    pub fn get(&self, index: usize) -> Result<&T, AccessError> {
        let res = self.resource().ok_or(AccessError::NullAccess)?;
        let len = res.count();

        if index >= len {
            return Err(AccessError::OutOfRange { index, len });
        }

        // SAFETY: `index` is in bounds and every shared value is initialized.
        Ok(unsafe { res.get(index) })
    }

    /// All shared values as a slice (a scalar is a one-element slice).
    pub fn as_slice(&self) -> Result<&[T], AccessError> {
        let res = self.resource().ok_or(AccessError::NullAccess)?;

        // SAFETY: every shared value is initialized.
        Ok(unsafe { res.as_slice() })
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_slice() {
            Ok(values) => f
                .debug_struct("Shared")
                .field("values", &values)
                .field("use_count", &self.use_count())
                .finish(),
            Err(_) => f.write_str("Shared(<empty>)"),
        }
    }
}

// -----------------------------------------------------------------------------
// Conversion from exclusive ownership

impl<T> Exclusive<T> {
    /// Converts exclusive ownership into shared ownership with a strong
    /// count of 1. An empty exclusive owner becomes an empty shared owner.
    ///
    /// On control-block allocation failure the resource is released before
    /// the error is returned; no partial owner is produced.
    ///
    /// # Examples
    ///
    /// ```
    /// use own_ptr::Exclusive;
    ///
    /// let owner = Exclusive::scalar(7).unwrap();
    /// let shared = owner.into_shared().unwrap();
    ///
    /// assert_eq!(shared.use_count(), 1);
    /// assert_eq!(shared.try_deref().copied().unwrap(), 7);
    /// ```
    pub fn into_shared(self) -> Result<Shared<T>, AllocError> {
        match self.into_parts() {
            Some(resource) => Shared::from_resource(resource),
            None => Ok(Shared::empty()),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::Shared;
    use crate::{AccessError, Exclusive};

    struct Probe<'a>(&'a AtomicUsize);

    impl Drop for Probe<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn counts_rise_and_fall_monotonically() {
        let a = Shared::scalar(10).unwrap();
        assert_eq!(a.use_count(), 1);

        let mut clones: Vec<_> = (0..4).map(|_| a.clone()).collect();
        assert_eq!(a.use_count(), 5);

        for expected in (1..5).rev() {
            clones.pop();
            assert_eq!(a.use_count(), expected);
        }
    }

    #[test]
    fn release_fires_once_across_clones() {
        let drops = AtomicUsize::new(0);

        {
            let a = Shared::scalar(Probe(&drops)).unwrap();
            let b = a.clone();
            let c = b.clone();

            drop(a);
            drop(b);
            assert_eq!(drops.load(Ordering::Relaxed), 0);
            drop(c);
        }

        assert_eq!(drops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn shared_sequence_scenario() {
        // Allocate [1,2,3,4,5], duplicate, reset the duplicate, index the
        // original, then drop it.
        let drops = AtomicUsize::new(0);

        let values = [1, 2, 3, 4, 5];
        let a = Shared::sequence_with(5, |i| (values[i], Probe(&drops))).unwrap();

        let mut b = a.clone();
        assert_eq!(a.use_count(), 2);

        b.reset();
        assert_eq!(a.use_count(), 1);
        assert!(b.is_empty());
        assert_eq!(b.try_deref().err(), Some(AccessError::NullAccess));

        assert_eq!(a.get(2).unwrap().0, 3);
        assert_eq!(drops.load(Ordering::Relaxed), 0);

        drop(a);
        assert_eq!(drops.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn reset_on_empty_is_noop() {
        let mut owner = Shared::<u32>::empty();
        assert_eq!(owner.use_count(), 0);

        owner.reset();
        assert!(owner.is_empty());
        assert_eq!(owner.try_deref(), Err(AccessError::NullAccess));
    }

    #[test]
    fn cloning_empty_shares_emptiness() {
        let a = Shared::<u32>::empty();
        let b = a.clone();

        assert!(b.is_empty());
        assert_eq!(b.use_count(), 0);
    }

    #[test]
    fn out_of_range_index() {
        let seq = Shared::from_slice(&[1u8, 2, 3, 4, 5]).unwrap();

        assert_eq!(seq.get(4).copied(), Ok(5));
        assert_eq!(seq.get(5), Err(AccessError::OutOfRange { index: 5, len: 5 }));
    }

    #[test]
    fn into_shared_preserves_resource() {
        let drops = AtomicUsize::new(0);

        let owner = Exclusive::sequence_with(3, |_| Probe(&drops)).unwrap();
        let shared = owner.into_shared().unwrap();

        assert_eq!(shared.use_count(), 1);
        assert_eq!(shared.count(), 3);
        assert_eq!(drops.load(Ordering::Relaxed), 0);

        drop(shared);
        assert_eq!(drops.load(Ordering::Relaxed), 3);

        let empty = Exclusive::<u32>::empty().into_shared().unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn assignment_gives_up_previous_share() {
        let drops = AtomicUsize::new(0);

        let mut owner = Shared::scalar(Probe(&drops)).unwrap();
        owner = Shared::scalar(Probe(&drops)).unwrap();

        assert_eq!(drops.load(Ordering::Relaxed), 1);
        drop(owner);
        assert_eq!(drops.load(Ordering::Relaxed), 2);
    }

    #[cfg(feature = "std")]
    #[test]
    fn concurrent_clone_and_drop_release_once() {
        use std::thread;

        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct StaticProbe;
        impl Drop for StaticProbe {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::Relaxed);
            }
        }

        let seed = Shared::scalar(StaticProbe).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let owner = seed.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let clone = owner.clone();
                        drop(clone);
                    }
                })
            })
            .collect();

        drop(seed);
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(DROPS.load(Ordering::Relaxed), 1);
    }
}
