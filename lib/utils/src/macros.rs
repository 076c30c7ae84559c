//! Macros for defining thin register-value newtypes and debug-only logging.

/// Implement conversions, [Deref](core::ops::Deref) and const constructors for a
/// single-field newtype whose field is named `inner`.
#[macro_export]
macro_rules! impl_basic {
    ($name: ident, $type: ty) => {
        impl core::convert::From<$type> for $name {
            fn from(value: $type) -> Self {
                $name { inner: value }
            }
        }
        impl core::convert::From<$name> for $type {
            fn from(value: $name) -> $type {
                value.inner
            }
        }

        impl core::ops::Deref for $name {
            type Target = $type;

            fn deref(&self) -> &Self::Target {
                &self.inner
            }
        }

        impl $name {
            pub const fn from_const(value: $type) -> Self {
                $name { inner: value }
            }
            pub const fn into_const(self) -> $type {
                self.inner
            }
        }
    };
}

/// Implement the bitwise set operations used by interrupt masks and status words.
#[macro_export]
macro_rules! impl_bitset {
    ($name: ident, $type: ty) => {
        impl core::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: Self) -> Self::Output {
                $name {
                    inner: self.inner | rhs.inner,
                }
            }
        }

        impl core::ops::BitAnd for $name {
            type Output = $name;
            fn bitand(self, rhs: Self) -> Self::Output {
                $name {
                    inner: self.inner & rhs.inner,
                }
            }
        }

        impl core::ops::Not for $name {
            type Output = $name;
            fn not(self) -> Self::Output {
                $name { inner: !self.inner }
            }
        }

        impl $name {
            /// An empty set.
            pub const fn empty() -> Self {
                $name { inner: 0 }
            }

            pub const fn is_empty(&self) -> bool {
                self.inner == 0
            }

            /// Whether every bit of `self` is also set in `other`.
            pub const fn is_subset_of(&self, other: &Self) -> bool {
                self.inner & other.inner == self.inner
            }

            pub const fn count(&self) -> u32 {
                self.inner.count_ones()
            }
        }
    };
}

/// Defines a `#[repr(C)]` newtype with [Deref](core::ops::Deref) and conversions.
/// The `bits` variant adds the bitwise set operations.
#[macro_export]
macro_rules! define_struct {
    (bits, $name: ident, $type: ty) => {
        #[allow(missing_docs)]
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Hash)]
        #[repr(C)]
        pub struct $name {
            inner: $type,
        }

        $crate::impl_basic!($name, $type);
        $crate::impl_bitset!($name, $type);
    };
}

/// Improved debug macro,
/// only compiled in debug mode.
#[macro_export]
macro_rules! debug_ex {
    // debug_ex!(target: "my_target", "a {} event", "log")
    (target: $target:expr, $($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            $crate::__log::log!(target: $target, $crate::__log::Level::Debug, $($arg)+)
        }
    };

    // debug_ex!("a {} event", "log")
    ($($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            $crate::__log::log!($crate::__log::Level::Debug, $($arg)+)
        }
    }
}
