use core::fmt;
use core::ptr::NonNull;

use own_alloc::{AllocError, RawResource, alloc_scalar, alloc_sequence_with};

use crate::AccessError;

// -----------------------------------------------------------------------------
// Exclusive

/// The exclusive owner of a heap resource.
///
/// At most one live `Exclusive` holds a given resource. The type offers no
/// copy operation at all; ownership moves through
/// [`transfer`](Self::transfer), which leaves the source empty. When a
/// holding owner is dropped or [`reset`](Self::reset), the resource is
/// released exactly once through the strategy it was allocated with.
///
/// An owner is either *holding* or *empty*. Every access on an empty owner
/// fails with [`AccessError::NullAccess`]; an empty owner re-enters the
/// holding state only through [`from_parts`](Self::from_parts) or ordinary
/// assignment.
///
/// # Examples
///
/// ```
/// use own_ptr::Exclusive;
///
/// let mut a = Exclusive::scalar(100).unwrap();
/// let b = a.transfer();
///
/// assert!(a.is_empty());
/// assert_eq!(b.try_deref().copied().unwrap(), 100);
/// ```
pub struct Exclusive<T> {
    res: Option<RawResource<T>>,
}

// SAFETY: `Exclusive<T>` uniquely owns its values; sending it sends them.
unsafe impl<T: Send> Send for Exclusive<T> {}

// SAFETY: shared access through `Exclusive<T>` only yields `&T`.
unsafe impl<T: Sync> Sync for Exclusive<T> {}

// -----------------------------------------------------------------------------
// Construction

impl<T> Exclusive<T> {
    /// Creates an owner holding nothing.
    #[inline(always)]
    pub const fn empty() -> Self {
        Self { res: None }
    }

    /// Allocates a scalar resource holding `value` and takes ownership.
    pub fn scalar(value: T) -> Result<Self, AllocError> {
        Ok(Self { res: Some(alloc_scalar(value)?) })
    }

    /// Allocates a sequence of `len` values, initialized in order by
    /// `init(i)`, and takes ownership.
    ///
    /// # Examples
    ///
    /// ```
    /// use own_ptr::Exclusive;
    ///
    /// let seq = Exclusive::sequence_with(4, |i| i * i).unwrap();
    /// assert_eq!(seq.as_slice().unwrap(), &[0, 1, 4, 9]);
    /// ```
    pub fn sequence_with(len: usize, init: impl FnMut(usize) -> T) -> Result<Self, AllocError> {
        Ok(Self { res: Some(alloc_sequence_with(len, init)?) })
    }

    /// Allocates a sequence cloned from `values`.
    pub fn from_slice(values: &[T]) -> Result<Self, AllocError>
    where
        T: Clone,
    {
        Self::sequence_with(values.len(), |i| values[i].clone())
    }

    /// Adopts a resource previously obtained from
    /// [`into_parts`](Self::into_parts), or rebuilt with
    /// [`RawResource::from_raw_parts`] after a [`release`](Self::release).
    ///
    /// # Safety
    /// - No other live owner may hold `res`.
    /// - Every value in `res` must be initialized.
    #[inline(always)]
    pub const unsafe fn from_parts(res: RawResource<T>) -> Self {
        Self { res: Some(res) }
    }
}

// -----------------------------------------------------------------------------
// Access

impl<T> Exclusive<T> {
    /// Returns `true` if the owner holds no resource.
    ///
    /// A zero-length sequence is still a held resource; `is_empty` is about
    /// the owner, not the number of values.
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.res.is_none()
    }

    /// Number of values currently held (0 when empty, 1 for a scalar).
    #[inline]
    pub fn count(&self) -> usize {
        self.res.as_ref().map_or(0, RawResource::count)
    }

    /// The first held value.
    ///
    /// Fails with [`AccessError::NullAccess`] on an empty owner, or
    /// [`AccessError::OutOfRange`] on a zero-length sequence.
    #[inline]
    pub fn try_deref(&self) -> Result<&T, AccessError> {
        self.get(0)
    }

    /// The first held value, mutably.
    #[inline]
    pub fn try_deref_mut(&mut self) -> Result<&mut T, AccessError> {
        self.get_mut(0)
    }

    /// The value at `index`, bounds-checked.
    ///
    /// # Examples
    ///
    /// ```
    /// use own_ptr::{AccessError, Exclusive};
    ///
    /// let seq = Exclusive::from_slice(&[1, 2, 3, 4, 5]).unwrap();
    ///
    /// assert_eq!(seq.get(2).copied().unwrap(), 3);
    /// assert_eq!(seq.get(5), Err(AccessError::OutOfRange { index: 5, len: 5 }));
    /// ```
    pub fn get(&self, index: usize) -> Result<&T, AccessError> {
        let res = self.res.as_ref().ok_or(AccessError::NullAccess)?;
        let len = res.count();

        if index >= len {
            return Err(AccessError::OutOfRange { index, len });
        }

        // SAFETY: `index` is in bounds and every held value is initialized.
        Ok(unsafe { res.get(index) })
    }

    /// The value at `index`, mutably, bounds-checked.
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T, AccessError> {
        let res = self.res.as_mut().ok_or(AccessError::NullAccess)?;
        let len = res.count();

        if index >= len {
            return Err(AccessError::OutOfRange { index, len });
        }

        // SAFETY: `index` is in bounds and every held value is initialized.
        Ok(unsafe { res.get_mut(index) })
    }

    /// All held values as a slice (a scalar is a one-element slice).
    pub fn as_slice(&self) -> Result<&[T], AccessError> {
        let res = self.res.as_ref().ok_or(AccessError::NullAccess)?;

        // SAFETY: every held value is initialized.
        Ok(unsafe { res.as_slice() })
    }

    /// All held values as a mutable slice.
    pub fn as_mut_slice(&mut self) -> Result<&mut [T], AccessError> {
        let res = self.res.as_mut().ok_or(AccessError::NullAccess)?;

        // SAFETY: every held value is initialized.
        Ok(unsafe { res.as_mut_slice() })
    }
}

// -----------------------------------------------------------------------------
// Ownership movement

impl<T> Exclusive<T> {
    /// Moves the resource into a fresh owner, leaving `self` empty.
    ///
    /// This is the only way ownership travels between `Exclusive` instances.
    /// Transferring from an empty owner yields an empty owner.
    ///
    /// # Examples
    ///
    /// ```
    /// use own_ptr::{AccessError, Exclusive};
    ///
    /// let mut a = Exclusive::scalar(100).unwrap();
    /// let b = a.transfer();
    ///
    /// assert_eq!(a.try_deref(), Err(AccessError::NullAccess));
    /// assert_eq!(b.try_deref().copied().unwrap(), 100);
    /// ```
    #[must_use = "transferring moves the resource into the returned owner"]
    #[inline]
    pub fn transfer(&mut self) -> Exclusive<T> {
        Exclusive { res: self.res.take() }
    }

    /// Hands the resource, together with its release strategy, to the
    /// caller. The caller is responsible for releasing it exactly once,
    /// either through [`RawResource::release`] or by re-adopting it with
    /// [`from_parts`](Self::from_parts).
    #[must_use = "dropping the parts leaks the resource"]
    #[inline]
    pub fn into_parts(mut self) -> Option<RawResource<T>> {
        self.res.take()
    }

    /// Gives up ownership and returns the bare data pointer, without the
    /// release strategy.
    ///
    /// After this call nothing manages the allocation: values will not be
    /// dropped and the memory will not be freed. The only way back is to
    /// rebuild the resource with [`RawResource::from_raw_parts`], using the
    /// same shape it was allocated with, and adopt it via
    /// [`from_parts`](Self::from_parts). Prefer [`into_parts`](Self::into_parts),
    /// which keeps the strategy attached.
    pub fn release(&mut self) -> Option<NonNull<T>> {
        let res = self.res.take()?;
        log::debug!("exclusive owner released its resource to the caller unmanaged");
        Some(res.as_non_null())
    }

    /// Releases the held resource, if any. A no-op on an empty owner.
    ///
    /// To replace the resource instead, assign a new owner: the previous
    /// resource is released when the old value is dropped.
    pub fn reset(&mut self) {
        if let Some(res) = self.res.take() {
            // SAFETY: the owner held the resource, so it is initialized and
            // has not been released.
            unsafe { res.release() };
        }
    }
}

impl<T> Drop for Exclusive<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> Default for Exclusive<T> {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for Exclusive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_slice() {
            Ok(values) => f.debug_tuple("Exclusive").field(&values).finish(),
            Err(_) => f.write_str("Exclusive(<empty>)"),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
