//! Decimal-string amount handling.
//!
//! All amounts cross the wire as non-negative integer decimal strings in the
//! asset's smallest unit (no thousands separators, no leading zeros other
//! than `"0"`). Inside the implementation they are `i128` values, wide
//! enough for contract-token transfers.

use crate::ProtocolError;

/// Number of stroops in one unit of the native asset.
pub const STROOPS_PER_UNIT: i128 = 10_000_000;

/// Decimal count of the native asset (and the default for contract assets).
pub const NATIVE_DECIMALS: u32 = 7;

/// Parses a wire amount string into an integer.
///
/// Accepts only canonical non-negative integers: ASCII digits with no sign,
/// no separators, and no leading zeros other than the single string `"0"`.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidAmount`] on any deviation.
pub fn parse_amount(value: &str) -> Result<i128, ProtocolError> {
    if value.is_empty() {
        return Err(invalid(value, "empty"));
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(value, "non-digit character"));
    }
    if value.len() > 1 && value.starts_with('0') {
        return Err(invalid(value, "leading zero"));
    }
    value
        .parse::<i128>()
        .map_err(|_| invalid(value, "out of range"))
}

/// Converts a human-readable decimal price into smallest-unit form.
///
/// `"1.5"` with 7 decimals becomes `15000000`; fractional digits beyond the
/// asset's decimal count are truncated. Whole-number strings are treated as
/// already being in the smallest unit and pass through unchanged.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidAmount`] if the string is not a
/// non-negative decimal number or the scaled value overflows.
pub fn decimal_to_atomic(value: &str, decimals: u32) -> Result<i128, ProtocolError> {
    let Some((whole, frac)) = value.split_once('.') else {
        return parse_amount(value);
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(invalid(value, "empty"));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(value, "non-digit character"));
    }

    let scale = 10_i128
        .checked_pow(decimals)
        .ok_or_else(|| invalid(value, "decimal count too large"))?;
    let whole_part = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<i128>()
            .map_err(|_| invalid(value, "out of range"))?
    };

    // Truncate fractional digits beyond the asset's precision.
    let frac = &frac[..frac.len().min(decimals as usize)];
    let mut frac_part = if frac.is_empty() {
        0
    } else {
        frac.parse::<i128>()
            .map_err(|_| invalid(value, "out of range"))?
    };
    frac_part *= 10_i128.pow(decimals - frac.len() as u32);

    whole_part
        .checked_mul(scale)
        .and_then(|scaled| scaled.checked_add(frac_part))
        .ok_or_else(|| invalid(value, "out of range"))
}

fn invalid(value: &str, reason: &'static str) -> ProtocolError {
    ProtocolError::InvalidAmount {
        value: value.to_owned(),
        reason,
    }
}
