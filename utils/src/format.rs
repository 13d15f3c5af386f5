//! Human-readable formatting for log output.

use peg_types::Amount;

/// Format a duration in seconds to a human-readable string.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Render a raw amount with `decimals` fractional digits, trimming
/// trailing zeros (`1500000000000000000`, 18 → `1.5`).
pub fn format_amount(raw: Amount, decimals: u32) -> String {
    let Some(unit) = 10u128.checked_pow(decimals) else {
        return raw.to_string();
    };
    let whole = raw / unit;
    let frac = raw % unit;
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
