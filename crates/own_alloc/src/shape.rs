use core::alloc::Layout;

use crate::AllocError;

// -----------------------------------------------------------------------------
// Shape

/// The release strategy of a resource: one value, or `len` contiguous values.
///
/// A shape is selected exactly once, by the allocation entry point that
/// creates the resource ([`alloc_scalar`](crate::alloc_scalar) or
/// [`alloc_sequence_with`](crate::alloc_sequence_with)), and travels
/// unchanged through every owner that subsequently manages that resource.
/// Release always goes through [`RawResource::release`](crate::RawResource::release),
/// which reads the shape the resource was allocated with, so a scalar
/// allocation can never be freed as a sequence or vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A single heap value.
    Scalar,

    /// `len` contiguously laid-out values.
    Sequence { len: usize },
}

impl Shape {
    /// Number of values managed under this shape (1 for a scalar).
    #[inline(always)]
    pub const fn count(self) -> usize {
        match self {
            Shape::Scalar => 1,
            Shape::Sequence { len } => len,
        }
    }

    /// The backing layout for a resource of `T` with this shape.
    ///
    /// Fails with [`AllocError::Oversized`] if the total size would exceed
    /// `isize::MAX`. The layout of a zero-length sequence (or any shape over
    /// a zero-sized type) has size 0 and allocates nothing.
    pub const fn layout<T>(self) -> Result<Layout, AllocError> {
        let item = Layout::new::<T>();
        let count = self.count();

        let Some(size) = item.size().checked_mul(count) else {
            return Err(AllocError::Oversized { len: count });
        };

        if size > isize::MAX as usize {
            return Err(AllocError::Oversized { len: count });
        }

        // SAFETY: `size` was checked against `isize::MAX`; the alignment is
        // taken from a valid `Layout` and each item size is a multiple of it.
        Ok(unsafe { Layout::from_size_align_unchecked(size, item.align()) })
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::Shape;
    use crate::AllocError;

    #[test]
    fn counts() {
        assert_eq!(Shape::Scalar.count(), 1);
        assert_eq!(Shape::Sequence { len: 0 }.count(), 0);
        assert_eq!(Shape::Sequence { len: 7 }.count(), 7);
    }

    #[test]
    fn layouts() {
        let layout = Shape::Scalar.layout::<u64>().unwrap();
        assert_eq!(layout.size(), 8);
        assert_eq!(layout.align(), 8);

        let layout = Shape::Sequence { len: 5 }.layout::<u32>().unwrap();
        assert_eq!(layout.size(), 20);
        assert_eq!(layout.align(), 4);

        assert_eq!(Shape::Sequence { len: 3 }.layout::<()>().unwrap().size(), 0);
        assert_eq!(Shape::Sequence { len: 0 }.layout::<u32>().unwrap().size(), 0);
    }

    #[test]
    fn oversized() {
        let huge = Shape::Sequence { len: usize::MAX };
        assert_eq!(
            huge.layout::<u64>(),
            Err(AllocError::Oversized { len: usize::MAX }),
        );

        // Fits in a usize product but not in an allocation.
        let half = Shape::Sequence { len: (isize::MAX as usize / 2) + 1 };
        assert_eq!(
            half.layout::<u16>(),
            Err(AllocError::Oversized { len: half.count() }),
        );
    }
}
