use core::fmt;

/// A byte offset into an [`Arena`](crate::Arena).
///
/// Offsets are the only way to address arena memory: they survive
/// relocation, persistence, and are meaningful for either [`Target`](crate::Target).
/// Offset `0` is reserved and means "null / absent"; no allocation ever
/// starts there.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Offset(u32);

impl Offset {
    /// The null offset.
    pub const NULL: Offset = Offset(0);

    /// Wraps a raw offset.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw offset value.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The raw offset as a `usize`.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Returns `true` for [`Offset::NULL`].
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// `None` for the null offset, `Some(self)` otherwise.
    #[inline]
    pub const fn non_null(self) -> Option<Self> {
        if self.is_null() { None } else { Some(self) }
    }

    /// Advances the offset by `bytes`, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, bytes: u32) -> Option<Self> {
        match self.0.checked_add(bytes) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Converts a `usize` position into an offset, if it fits the 32-bit offset space.
    #[inline]
    pub fn from_usize(pos: usize) -> Option<Self> {
        u32::try_from(pos).ok().map(Self)
    }
}

impl fmt::Debug for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Offset(null)")
        } else {
            write!(f, "Offset({:#x})", self.0)
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Rounds `value` up to the next multiple of `align` (a power of two).
///
/// Returns `None` on overflow.
#[inline]
pub const fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    let mask = align - 1;
    match value.checked_add(mask) {
        Some(v) => Some(v & !mask),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_next_multiple() {
        deflate_testhelpers::setup();
        assert_eq!(align_up(0, 8), Some(0));
        assert_eq!(align_up(1, 8), Some(8));
        assert_eq!(align_up(8, 8), Some(8));
        assert_eq!(align_up(9, 4), Some(12));
        assert_eq!(align_up(usize::MAX, 2), None);
    }

    #[test]
    fn null_offset() {
        deflate_testhelpers::setup();
        assert!(Offset::NULL.is_null());
        assert_eq!(Offset::NULL.non_null(), None);
        assert_eq!(Offset::new(12).non_null(), Some(Offset::new(12)));
        assert_eq!(Offset::new(u32::MAX).checked_add(1), None);
    }
}
