//! Double-precision emulation helpers.
//!
//! Shaders only have 32-bit floats. A 64-bit value is shipped as a pair
//! `(hi, lo)` where `hi` is the value rounded to `f32` and `lo` is the
//! residual, so that `hi + lo` recovers most of the lost mantissa bits.

/// Splits a double into a high `f32` part and a low `f32` residual.
///
/// `hi` is the IEEE-754 round-to-nearest-even `f32` of `value`.
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub fn fp64ify(value: f64) -> [f32; 2] {
    let hi = value as f32;
    let lo = (value - f64::from(hi)) as f32;
    [hi, lo]
}

/// Reconstructs a double from a split pair.
#[inline]
pub fn fp64_join(pair: [f32; 2]) -> f64 {
    f64::from(pair[0]) + f64::from(pair[1])
}

/// Splits a column-major 4x4 matrix into 32 floats.
///
/// Element `(row, col)` is written at `(row * 4 + col) * 2`, which is the
/// layout the fp64 shader modules read.
pub fn fp64ify_matrix4(columns: &[f64; 16]) -> [f32; 32] {
    let mut out = [0.0_f32; 32];
    for row in 0..4 {
        for col in 0..4 {
            let [hi, lo] = fp64ify(columns[col * 4 + row]);
            out[(row * 4 + col) * 2] = hi;
            out[(row * 4 + col) * 2 + 1] = lo;
        }
    }
    out
}
