use num_traits::PrimInt;

/// Greatest common divisor of two 32-bit values.
pub fn gcd(a: u32, b: u32) -> u32 {
    euclid(a, b)
}

/// Greatest common divisor of two 64-bit values.
pub fn lgcd(a: u64, b: u64) -> u64 {
    euclid(a, b)
}

/// Greatest common divisor of a slice of lengths.
///
/// Returns 1 as soon as any element is 1 or less, and stops folding once the running divisor
/// reaches 1. An empty slice also yields 1.
pub fn lgcd_array<T: PrimInt>(values: &[T]) -> T {
    if values.is_empty() || values.iter().any(|&v| v <= T::one()) {
        return T::one();
    }

    let mut acc = values[0];
    for &v in &values[1..] {
        acc = euclid(acc, v);
        if acc == T::one() {
            break;
        }
    }
    acc
}

/// Iterative Euclid.
pub(crate) fn euclid<T: PrimInt>(mut a: T, mut b: T) -> T {
    while !b.is_zero() {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}
