//! Flag sets stored as a single byte inside schema records.

/// Defines a copyable flag set over an unsigned integer.
///
/// The generated type exposes one associated constant per flag, the usual
/// set operations, and lossy conversion from raw bits (unknown bits are
/// dropped, so a record written by a newer writer still decodes).
macro_rules! bitflags {
    (
        $(#[$outer:meta])*
        $vis:vis struct $Name:ident : $T:ty {
            $(
                $(#[$inner:meta])*
                const $FLAG:ident = $value:expr;
            )*
        }
    ) => {
        $(#[$outer])*
        #[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        $vis struct $Name($T);

        impl $Name {
            $(
                $(#[$inner])*
                pub const $FLAG: Self = Self($value);
            )*

            const ALL_BITS: $T = 0 $(| $value)*;

            /// No flags set.
            #[inline]
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Returns `true` if no flag is set.
            #[inline]
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Returns `true` if every flag in `other` is set in `self`.
            #[inline]
            pub const fn contains(self, other: Self) -> bool {
                (self.0 & other.0) == other.0
            }

            /// Sets the flags in `other`.
            #[inline]
            pub const fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            /// Clears the flags in `other`.
            #[inline]
            pub const fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }

            /// Sets or clears the flags in `other` depending on `value`.
            #[inline]
            pub const fn set(&mut self, other: Self, value: bool) {
                if value {
                    self.insert(other);
                } else {
                    self.remove(other);
                }
            }

            /// The raw bits, as stored in a record.
            #[inline]
            pub const fn bits(self) -> $T {
                self.0
            }

            /// Builds a flag set from raw bits, dropping unknown bits.
            #[inline]
            pub const fn from_bits_truncate(bits: $T) -> Self {
                Self(bits & Self::ALL_BITS)
            }
        }

        impl ::core::fmt::Debug for $Name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                let mut set = f.debug_set();
                $(
                    if self.contains(Self::$FLAG) {
                        set.entry(&format_args!("{}", stringify!($FLAG)));
                    }
                )*
                set.finish()
            }
        }

        impl ::core::ops::BitOr for $Name {
            type Output = Self;
            #[inline]
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl ::core::ops::BitOrAssign for $Name {
            #[inline]
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

pub(crate) use bitflags;
