use portable_atomic::{AtomicPtr, AtomicU32, AtomicU64, Ordering};
use std::{fmt, ptr};

/// Every operation in this module is sequentially consistent. The callers in
/// this crate hand values between threads through these words with no other
/// synchronization, so each read-modify-write must publish its result to all
/// threads before the caller proceeds.
const ORDER: Ordering = Ordering::SeqCst;

/// Generates an atomic word type over one unsigned integer width.
///
/// Each generated type wraps the matching `portable-atomic` integer so the
/// same implementation serves targets with and without native atomics of that
/// width. All methods are unconditional: there is no error return anywhere in
/// the primitive layer, and only the packed-half increments on
/// [`AtomicWord64`] loop internally.
macro_rules! impl_atomic_word {
    ($name:ident, $inner:ty, $value:ty, $doc:expr) => {
        #[doc = concat!("An atomically accessed ", $doc, ".")]
        ///
        /// Once a value of this type is shared between threads it must only
        /// be touched through these methods; there is no way to obtain a
        /// plain reference to the underlying integer.
        #[repr(transparent)]
        #[derive(Default)]
        pub struct $name {
            inner: $inner,
        }

        impl $name {
            /// Create a new word holding `value`.
            #[must_use]
            pub const fn new(value: $value) -> Self {
                Self {
                    inner: <$inner>::new(value),
                }
            }

            /// Atomically load the current value.
            #[inline]
            #[must_use]
            pub fn get(&self) -> $value {
                self.inner.load(ORDER)
            }

            /// Atomically store `value`, returning the previous value.
            #[inline]
            pub fn set(&self, value: $value) -> $value {
                self.inner.swap(value, ORDER)
            }

            /// Atomically add `value`, returning the pre-operation value.
            #[inline]
            pub fn fetch_add(&self, value: $value) -> $value {
                self.inner.fetch_add(value, ORDER)
            }

            /// Atomically subtract `value`, returning the pre-operation value.
            #[inline]
            pub fn fetch_sub(&self, value: $value) -> $value {
                self.inner.fetch_sub(value, ORDER)
            }

            /// Atomically bitwise-OR `value`, returning the pre-operation value.
            #[inline]
            pub fn fetch_or(&self, value: $value) -> $value {
                self.inner.fetch_or(value, ORDER)
            }

            /// Atomically bitwise-AND `value`, returning the pre-operation value.
            #[inline]
            pub fn fetch_and(&self, value: $value) -> $value {
                self.inner.fetch_and(value, ORDER)
            }

            /// Atomically bitwise-XOR `value`, returning the pre-operation value.
            #[inline]
            pub fn fetch_xor(&self, value: $value) -> $value {
                self.inner.fetch_xor(value, ORDER)
            }

            /// Atomically add `value`, returning the post-operation value.
            #[inline]
            pub fn add_and_fetch(&self, value: $value) -> $value {
                self.inner.fetch_add(value, ORDER).wrapping_add(value)
            }

            /// Atomically subtract `value`, returning the post-operation value.
            #[inline]
            pub fn sub_and_fetch(&self, value: $value) -> $value {
                self.inner.fetch_sub(value, ORDER).wrapping_sub(value)
            }

            /// Atomically bitwise-OR `value`, returning the post-operation value.
            #[inline]
            pub fn or_and_fetch(&self, value: $value) -> $value {
                self.inner.fetch_or(value, ORDER) | value
            }

            /// Atomically bitwise-AND `value`, returning the post-operation value.
            #[inline]
            pub fn and_and_fetch(&self, value: $value) -> $value {
                self.inner.fetch_and(value, ORDER) & value
            }

            /// Atomically bitwise-XOR `value`, returning the post-operation value.
            #[inline]
            pub fn xor_and_fetch(&self, value: $value) -> $value {
                self.inner.fetch_xor(value, ORDER) ^ value
            }

            /// Atomically increment by one, returning the post-operation value.
            #[inline]
            pub fn inc(&self) -> $value {
                self.add_and_fetch(1)
            }

            /// Atomically decrement by one, returning the post-operation value.
            #[inline]
            pub fn dec(&self) -> $value {
                self.sub_and_fetch(1)
            }

            /// Single compare-and-swap attempt: store `new` iff the current
            /// value equals `expected`. Returns whether the swap happened.
            /// Never loops; a caller that wants a retry loop writes it
            /// itself.
            #[inline]
            pub fn bool_cas(&self, expected: $value, new: $value) -> bool {
                self.inner
                    .compare_exchange(expected, new, ORDER, ORDER)
                    .is_ok()
            }

            /// Single compare-and-swap attempt returning the value observed
            /// immediately before the attempt. The swap happened iff the
            /// returned value equals `expected`.
            #[inline]
            pub fn val_cas(&self, expected: $value, new: $value) -> $value {
                match self.inner.compare_exchange(expected, new, ORDER, ORDER) {
                    Ok(prev) | Err(prev) => prev,
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.get()).finish()
            }
        }
    };
}

impl_atomic_word!(AtomicWord32, AtomicU32, u32, "32-bit machine word");
impl_atomic_word!(AtomicWord64, AtomicU64, u64, "64-bit machine word");

const LOW_MASK: u64 = 0x0000_0000_FFFF_FFFF;
const HIGH_MASK: u64 = 0xFFFF_FFFF_0000_0000;

impl AtomicWord64 {
    /// Atomically increment only the upper 32 bits of the word, leaving the
    /// lower half untouched, and return the pre-increment value of the upper
    /// half.
    ///
    /// The increment wraps within its half. Internally this is a
    /// compare-and-swap retry loop: it terminates as soon as no competing
    /// write lands between the read and the swap.
    pub fn inc_high32(&self) -> u32 {
        loop {
            let old = self.inner.load(ORDER);
            let half = (old >> 32) as u32;
            let new = (u64::from(half.wrapping_add(1)) << 32) | (old & LOW_MASK);
            if self.inner.compare_exchange(old, new, ORDER, ORDER).is_ok() {
                return half;
            }
        }
    }

    /// Atomically increment only the lower 32 bits of the word, leaving the
    /// upper half untouched, and return the pre-increment value of the lower
    /// half.
    ///
    /// Counterpart of [`inc_high32`](Self::inc_high32) for the other half of
    /// a packed dual counter.
    pub fn inc_low32(&self) -> u32 {
        loop {
            let old = self.inner.load(ORDER);
            let half = old as u32;
            let new = (old & HIGH_MASK) | u64::from(half.wrapping_add(1));
            if self.inner.compare_exchange(old, new, ORDER, ORDER).is_ok() {
                return half;
            }
        }
    }
}

/// An atomically accessed, nullable reference-sized slot.
///
/// Holds a raw `*mut T` owned by the caller: this type never dereferences or
/// frees the pointee. Null is an ordinary value here — it is how the queue
/// marks a free slot — so every accessor hands raw pointers back unchanged.
#[repr(transparent)]
pub struct AtomicRef<T> {
    inner: AtomicPtr<T>,
}

impl<T> AtomicRef<T> {
    /// Create a new slot holding `ptr`.
    #[must_use]
    pub const fn new(ptr: *mut T) -> Self {
        Self {
            inner: AtomicPtr::new(ptr),
        }
    }

    /// Create a new slot holding null.
    #[must_use]
    pub const fn null() -> Self {
        Self::new(ptr::null_mut())
    }

    /// Atomically load the current pointer.
    #[inline]
    #[must_use]
    pub fn get(&self) -> *mut T {
        self.inner.load(ORDER)
    }

    /// Atomically store `ptr`, returning the previous pointer.
    #[inline]
    pub fn set(&self, ptr: *mut T) -> *mut T {
        self.inner.swap(ptr, ORDER)
    }

    /// Single compare-and-swap attempt: store `new` iff the slot currently
    /// holds `expected`. Returns whether the swap happened.
    #[inline]
    pub fn bool_cas(&self, expected: *mut T, new: *mut T) -> bool {
        self.inner
            .compare_exchange(expected, new, ORDER, ORDER)
            .is_ok()
    }

    /// Single compare-and-swap attempt returning the pointer observed
    /// immediately before the attempt.
    #[inline]
    pub fn val_cas(&self, expected: *mut T, new: *mut T) -> *mut T {
        match self.inner.compare_exchange(expected, new, ORDER, ORDER) {
            Ok(prev) | Err(prev) => prev,
        }
    }
}

impl<T> Default for AtomicRef<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for AtomicRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicRef").field(&self.get()).finish()
    }
}
