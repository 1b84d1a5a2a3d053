use std::time::Duration;

use crate::error::{CoreError, Result};

/// Parse a duration such as `10ms`, `1.5s` or `1h30m`.
///
/// Accepted units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare
/// `0` is also accepted. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let raw = input.trim();
    if raw == "0" {
        return Ok(Duration::ZERO);
    }
    if raw.is_empty() {
        return Err(CoreError::InvalidDuration(input.to_string()));
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = raw;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(CoreError::InvalidDuration(input.to_string()));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| CoreError::InvalidDuration(input.to_string()))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1_000.0,
            "ms" => 1_000_000.0,
            "s" => 1_000_000_000.0,
            "m" => 60.0 * 1_000_000_000.0,
            "h" => 3_600.0 * 1_000_000_000.0,
            _ => return Err(CoreError::InvalidDuration(input.to_string())),
        };
        rest = &rest[unit_len..];

        total_nanos += value * nanos_per_unit;
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
