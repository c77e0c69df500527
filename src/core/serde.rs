/*!
 * Serde Helpers
 * Skip-predicates shared by data-model types
 */

/// Skip serializing empty vectors
#[inline]
pub fn is_empty_vec<T>(v: &Vec<T>) -> bool {
    v.is_empty()
}

/// Skip serializing zero u64 values
#[inline]
pub fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

/// Skip serializing false booleans
#[inline]
pub fn is_false(v: &bool) -> bool {
    !(*v)
}
