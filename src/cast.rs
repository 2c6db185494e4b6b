//! Address-preserving pointer casts for upcasting shared pointers.

use core::ptr::NonNull;

/// Converts a pointer to `Self` into a pointer to `U` addressing the same
/// object, typically an unsizing cast to a trait object.
///
/// Every type casts to itself. Register further casts with
/// [`impl_static_cast!`](crate::impl_static_cast).
///
/// #   Safety
///
/// `static_cast` must return a pointer to the same address, valid for the
/// same allocation, without dereferencing its argument.
pub unsafe trait StaticCast<U: ?Sized> {
    fn static_cast(ptr: NonNull<Self>) -> NonNull<U>;
}

unsafe impl<T: ?Sized> StaticCast<T> for T {
    #[inline]
    fn static_cast(ptr: NonNull<T>) -> NonNull<T> {
        ptr
    }
}

/// Implements [`StaticCast`] for unsizing coercions.
///
/// ```
/// trait Shape { fn area(&self) -> f64; }
/// struct Square(f64);
/// impl Shape for Square { fn area(&self) -> f64 { self.0 * self.0 } }
/// memcore::impl_static_cast!(Square => dyn Shape);
///
/// let sq: memcore::SharedPtr<Square> = memcore::SharedPtr::new(Square(2.0));
/// let shape: memcore::SharedPtr<dyn Shape> = sq.upcast();
/// assert_eq!(shape.area(), 4.0);
/// ```
#[macro_export]
macro_rules! impl_static_cast {
    ($($from:ty => $to:ty),+ $(,)?) => {
        $(
            unsafe impl $crate::StaticCast<$to> for $from {
                #[inline]
                fn static_cast(ptr: ::core::ptr::NonNull<Self>) -> ::core::ptr::NonNull<$to> {
                    ptr
                }
            }
        )+
    };
}

/// [`StaticCast::static_cast`] with a debug-build check that the address is
/// preserved.
#[inline]
pub(crate) fn safe_cast<T, U>(ptr: NonNull<T>) -> NonNull<U>
where
    T: ?Sized + StaticCast<U>,
    U: ?Sized,
{
    let cast = T::static_cast(ptr);
    debug_assert_eq!(
        ptr.cast::<u8>(),
        cast.cast::<u8>(),
        "static cast moved the pointer"
    );
    cast
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named {
        fn name(&self) -> &'static str;
    }
    struct Cat;
    impl Named for Cat {
        fn name(&self) -> &'static str {
            "cat"
        }
    }
    crate::impl_static_cast!(Cat => dyn Named);

    #[test]
    fn unsizing_cast_keeps_address() {
        let cat = Cat;
        let p = NonNull::from(&cat);
        let n: NonNull<dyn Named> = safe_cast(p);
        assert_eq!(unsafe { n.as_ref() }.name(), "cat");
        assert_eq!(n.cast::<u8>(), p.cast::<u8>());
    }

    #[test]
    fn identity_cast() {
        let x = 3u32;
        let p = NonNull::from(&x);
        let q: NonNull<u32> = safe_cast(p);
        assert_eq!(p, q);
    }
}
