//! Q16.16 Fixed-Point Arithmetic
//!
//! Deterministic fixed-point math shared by the client build and the server.
//! Every operation is integer-only and re-truncates to 32 bits, so a result
//! computed on x86, ARM or WASM is bit-identical.
//!
//! ## Format: Q16.16
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Bit Layout: Q16.16 (32-bit signed integer)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  [S][IIIIIIIIIIIIIII][FFFFFFFFFFFFFFFF]                     │
//! │   │  └─── 15 bits ───┘└──── 16 bits ────┘                   │
//! │   └─ Sign bit                                               │
//! │                                                             │
//! │  Range: -32768.0 to +32767.99998 (approx)                   │
//! │  Precision: 1/65536 ≈ 0.000015 units                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Floats only cross this module at the boundary (`from_float` for
//! configuration, `to_float` for display). Boundary conversions reject values
//! that do not fit instead of wrapping them.

use thiserror::Error;

/// Q16.16 fixed-point number stored as i32.
pub type Fixed = i32;

/// Number of fractional bits (16)
pub const FIXED_SCALE: u32 = 16;

/// 1.0 in fixed-point (65536)
pub const FIXED_ONE: Fixed = 1 << FIXED_SCALE;

/// 0.5 in fixed-point (32768)
pub const FIXED_HALF: Fixed = FIXED_ONE >> 1;

/// Maximum positive value
pub const FIXED_MAX: Fixed = i32::MAX;

/// Minimum negative value
pub const FIXED_MIN: Fixed = i32::MIN;

/// Largest integer representable without wrapping.
pub const FIXED_INT_MAX: i32 = FIXED_MAX >> FIXED_SCALE;

/// Smallest integer representable without wrapping.
pub const FIXED_INT_MIN: i32 = FIXED_MIN >> FIXED_SCALE;

/// Mask selecting the fractional bits.
const FRACTION_MASK: Fixed = FIXED_ONE - 1;

/// Boundary conversion failures.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FixedError {
    /// NaN or infinity cannot be represented.
    #[error("non-finite value cannot be converted to fixed-point")]
    NonFinite,
    /// Value outside the Q16.16 range.
    #[error("value {0} is outside the Q16.16 range")]
    OutOfRange(f64),
}

// =============================================================================
// CONVERSIONS
// =============================================================================

/// Convert an integer to fixed-point.
///
/// Wraps like every other operation here; use [`try_from_int`] when the
/// integer comes from outside the simulation.
#[inline]
pub const fn from_int(i: i32) -> Fixed {
    i.wrapping_shl(FIXED_SCALE)
}

/// Convert an untrusted integer, rejecting values that would wrap.
pub fn try_from_int(i: i64) -> Result<Fixed, FixedError> {
    if i < FIXED_INT_MIN as i64 || i > FIXED_INT_MAX as i64 {
        return Err(FixedError::OutOfRange(i as f64));
    }
    Ok(from_int(i as i32))
}

/// Convert a float to fixed-point (round to nearest).
///
/// # Warning
/// Boundary only: configuration loading and tests. Never in the tick loop.
pub fn from_float(f: f64) -> Result<Fixed, FixedError> {
    if !f.is_finite() {
        return Err(FixedError::NonFinite);
    }
    let scaled = (f * FIXED_ONE as f64).round();
    if scaled < FIXED_MIN as f64 || scaled > FIXED_MAX as f64 {
        return Err(FixedError::OutOfRange(f));
    }
    Ok(scaled as Fixed)
}

/// Convert fixed-point to float for display/rendering.
///
/// # Warning
/// Only use for visual output. NEVER feed the result back into game logic.
#[inline]
pub fn to_float(f: Fixed) -> f64 {
    f as f64 / FIXED_ONE as f64
}

/// Integer part, rounding toward negative infinity.
///
/// `to_int(-0.5) == -1`, matching an arithmetic shift rather than C-style
/// truncation.
#[inline]
pub const fn to_int(f: Fixed) -> i32 {
    f >> FIXED_SCALE
}

// =============================================================================
// CORE OPERATIONS (All deterministic, wrapping semantics)
// =============================================================================

/// Add with 32-bit wraparound.
#[inline]
pub const fn fixed_add(a: Fixed, b: Fixed) -> Fixed {
    a.wrapping_add(b)
}

/// Subtract with 32-bit wraparound.
#[inline]
pub const fn fixed_sub(a: Fixed, b: Fixed) -> Fixed {
    a.wrapping_sub(b)
}

/// Multiply two fixed-point numbers.
///
/// Widens to i64, shifts back (arithmetic shift, floor) and truncates to 32 bits.
#[inline]
pub const fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    let wide = (a as i64) * (b as i64);
    (wide >> FIXED_SCALE) as Fixed
}

/// Divide two fixed-point numbers.
///
/// Pre-shifts the dividend in 64 bits, divides (truncating toward zero) and
/// truncates to 32 bits. Divide-by-zero saturates: `FIXED_MAX` for a
/// non-negative dividend, `FIXED_MIN` otherwise.
#[inline]
pub const fn fixed_div(a: Fixed, b: Fixed) -> Fixed {
    if b == 0 {
        return if a >= 0 { FIXED_MAX } else { FIXED_MIN };
    }
    let wide = (a as i64) << FIXED_SCALE;
    (wide / b as i64) as Fixed
}

/// Largest whole value not greater than `f`.
#[inline]
pub const fn fixed_floor(f: Fixed) -> Fixed {
    f & !FRACTION_MASK
}

/// Smallest whole value not less than `f`.
#[inline]
pub const fn fixed_ceil(f: Fixed) -> Fixed {
    fixed_floor(f.wrapping_add(FRACTION_MASK))
}

/// Round half up: `round(2.5) == 3.0`, `round(-2.5) == -2.0`.
#[inline]
pub const fn fixed_round(f: Fixed) -> Fixed {
    fixed_floor(f.wrapping_add(FIXED_HALF))
}

/// Absolute value of a fixed-point number.
#[inline]
pub const fn fixed_abs(x: Fixed) -> Fixed {
    if x < 0 { x.wrapping_neg() } else { x }
}

/// Minimum of two fixed-point numbers.
#[inline]
pub const fn fixed_min(a: Fixed, b: Fixed) -> Fixed {
    if a < b { a } else { b }
}

/// Maximum of two fixed-point numbers.
#[inline]
pub const fn fixed_max(a: Fixed, b: Fixed) -> Fixed {
    if a > b { a } else { b }
}

/// Clamp a fixed-point number to a range.
#[inline]
pub const fn fixed_clamp(value: Fixed, min: Fixed, max: Fixed) -> Fixed {
    fixed_max(min, fixed_min(max, value))
}

/// Linear interpolation: a + (b - a) * t
/// where t is in fixed-point (0.0 = 0, 1.0 = FIXED_ONE)
#[inline]
pub const fn fixed_lerp(a: Fixed, b: Fixed, t: Fixed) -> Fixed {
    let diff = b.wrapping_sub(a);
    a.wrapping_add(fixed_mul(diff, t))
}

/// Integer square root (floor) of a raw integer.
///
/// Intended for squared distances. Negative input yields 0.
pub fn isqrt(n: i32) -> i32 {
    if n <= 0 {
        return 0;
    }
    let n = n as i64;
    let mut x = n;
    let mut y = (x + 1) >> 1;
    while y < x {
        x = y;
        y = (x + n / x) >> 1;
    }
    x as i32
}

/// Square root of a fixed-point number.
///
/// `isqrt(raw) << 8`; 8 bits of fractional precision, identical to the
/// shipped client helper.
#[inline]
pub fn fixed_sqrt(f: Fixed) -> Fixed {
    isqrt(f).wrapping_shl(8)
}

/// Squared Euclidean distance between two fixed-point points.
///
/// Symmetric by construction: both deltas are squared.
#[inline]
pub const fn dist_sq(ax: Fixed, ay: Fixed, bx: Fixed, by: Fixed) -> Fixed {
    let dx = ax.wrapping_sub(bx);
    let dy = ay.wrapping_sub(by);
    fixed_mul(dx, dx).wrapping_add(fixed_mul(dy, dy))
}

/// Euclidean distance. Prefer [`dist_sq`] for comparisons.
#[inline]
pub fn distance(ax: Fixed, ay: Fixed, bx: Fixed, by: Fixed) -> Fixed {
    fixed_sqrt(dist_sq(ax, ay, bx, by))
}

// =============================================================================
// TESTS
// =============================================================================
