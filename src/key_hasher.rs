//! Hasher policies for [`HashMap`](crate::HashMap) keys.
//!
//! Open addressing without tombstones needs an in-band "empty" key. A
//! policy supplies the hash, the sentinel writer, equality and the
//! sentinel test for one key type.

use core::hash::BuildHasher;
use hashbrown::hash_map::DefaultHashBuilder;

pub trait KeyHasher<K> {
    fn hash(&self, key: &K) -> usize;

    /// Overwrites `key` with the sentinel value.
    fn invalidate(&self, key: &mut K);

    fn is_equal(&self, a: &K, b: &K) -> bool;

    /// False for the sentinel value, true otherwise.
    fn is_valid(&self, key: &K) -> bool;
}

/// Identity hashing for primitive integers; the sentinel is all bits set.
///
/// For signed types that is `-1`, which therefore cannot be stored as a key.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct IntHasher;

macro_rules! int_key_hasher {
    ($($t:ty),* $(,)?) => {
        $(
            impl KeyHasher<$t> for IntHasher {
                #[inline]
                fn hash(&self, key: &$t) -> usize {
                    *key as usize
                }

                #[inline]
                fn invalidate(&self, key: &mut $t) {
                    *key = !0;
                }

                #[inline]
                fn is_equal(&self, a: &$t, b: &$t) -> bool {
                    a == b
                }

                #[inline]
                fn is_valid(&self, key: &$t) -> bool {
                    *key != !0
                }
            }
        )*
    };
}

int_key_hasher!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

/// Hashes string slices with a [`BuildHasher`]; the sentinel is `""`.
#[derive(Clone, Debug, Default)]
pub struct StrHasher<S = DefaultHashBuilder> {
    state: S,
}

impl<S: BuildHasher> StrHasher<S> {
    pub fn with_hasher(state: S) -> Self {
        Self { state }
    }
}

impl<'a, S: BuildHasher> KeyHasher<&'a str> for StrHasher<S> {
    #[inline]
    fn hash(&self, key: &&'a str) -> usize {
        self.state.hash_one(*key) as usize
    }

    #[inline]
    fn invalidate(&self, key: &mut &'a str) {
        *key = "";
    }

    #[inline]
    fn is_equal(&self, a: &&'a str, b: &&'a str) -> bool {
        a == b
    }

    #[inline]
    fn is_valid(&self, key: &&'a str) -> bool {
        !key.is_empty()
    }
}
