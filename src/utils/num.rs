//! Numeric utilities: centralized integer conversions for pagination and telemetry.
//!
//! - Fallible conversions (`Option<T>`) where an out-of-range value must stop the operation.
//! - Saturating conversions where clamping is acceptable (durations and counters for logs).

#[inline]
#[must_use]
pub fn u64_to_usize(v: u64) -> Option<usize> {
    usize::try_from(v).ok()
}

#[inline]
#[must_use]
pub fn i64_to_u64(v: i64) -> Option<u64> {
    u64::try_from(v).ok()
}

#[inline]
#[must_use]
pub fn usize_to_u64(v: usize) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

#[inline]
#[must_use]
pub fn u128_to_u64_saturating(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

/// Reads an integral BSON number as `i64`. Doubles qualify only when they have no fractional part.
#[must_use]
pub fn bson_to_i64(v: &bson::Bson) -> Option<i64> {
    match v {
        bson::Bson::Int32(i) => Some(i64::from(*i)),
        bson::Bson::Int64(i) => Some(*i),
        #[allow(clippy::cast_possible_truncation)]
        bson::Bson::Double(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
        _ => None,
    }
}

/// Reads any numeric BSON value as `f64`.
#[must_use]
pub fn bson_to_f64(v: &bson::Bson) -> Option<f64> {
    #[allow(clippy::cast_precision_loss)]
    match v {
        bson::Bson::Int32(i) => Some(f64::from(*i)),
        bson::Bson::Int64(i) => Some(*i as f64),
        bson::Bson::Double(f) => Some(*f),
        bson::Bson::Decimal128(d) => d.to_string().parse::<f64>().ok(),
        _ => None,
    }
}
