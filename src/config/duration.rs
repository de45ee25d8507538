// src/config/duration.rs

use std::time::Duration;

/// Parse a duration such as `"20s"`, `"100ms"`, `"1m"` or `"2h"`.
///
/// Values that do not fit in a `Duration` are rejected rather than wrapped.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let digits_end = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;
    let (amount, unit) = s.split_at(digits_end);

    let amount: u64 = amount
        .parse()
        .map_err(|e| format!("invalid duration number '{amount}': {e}"))?;

    let seconds_per_unit = match unit.trim().to_lowercase().as_str() {
        "ms" => return Ok(Duration::from_millis(amount)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        other => {
            return Err(format!(
                "unsupported duration unit '{other}'; expected ms, s, m, or h"
            ));
        }
    };

    amount
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
