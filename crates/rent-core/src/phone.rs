//! # Phone Normalizer
//!
//! Maps user-entered Kenyan mobile numbers to the `2547XXXXXXXX` form the
//! M-Pesa gateway expects. Validation of the final number is left to the
//! gateway.

/// International dialling prefix for Kenya
pub const COUNTRY_PREFIX: &str = "254";

/// Normalize a raw phone string.
///
/// - all whitespace is removed
/// - a leading `0` is replaced by `254`
/// - a leading `7` or `1` gets `254` prepended
/// - anything else is returned as-is
pub fn normalize(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    if let Some(rest) = compact.strip_prefix('0') {
        format!("{}{}", COUNTRY_PREFIX, rest)
    } else if compact.starts_with('7') || compact.starts_with('1') {
        format!("{}{}", COUNTRY_PREFIX, compact)
    } else {
        compact
    }
}
