//! Duration strings in the `72h3m0.5s` form.
//!
//! Accepts a sequence of decimal numbers, each with an optional fraction and
//! a mandatory unit suffix (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`). The bare
//! string `0` is the only unit-less form accepted.

use std::time::Duration;

use crate::error::DurationError;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Parse a duration string like `"60s"`, `"1m30s"`, `"500ms"` or `"1.5h"`.
pub fn parse_go_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }

    let s = match s.strip_prefix('-') {
        Some(rest) if rest == "0" => return Ok(Duration::ZERO),
        Some(_) => return Err(DurationError::Negative(input.to_string())),
        None => s.strip_prefix('+').unwrap_or(s),
    };

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let mut total: u128 = 0;
    let mut rest = s;

    while !rest.is_empty() {
        // Integer part.
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        // Optional fraction.
        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after_dot.len());
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DurationError::Invalid(input.to_string()));
        }

        let unit_len = rest
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(rest.len());
        if unit_len == 0 {
            return Err(DurationError::MissingUnit(input.to_string()));
        }
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let scale = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| DurationError::Invalid(input.to_string()))?
        };

        let mut nanos = whole
            .checked_mul(scale)
            .ok_or_else(|| DurationError::Invalid(input.to_string()))?;

        if !frac_part.is_empty() {
            // Digits beyond nanosecond precision cannot contribute.
            let digits = &frac_part[..frac_part.len().min(18)];
            let numerator: u128 = digits
                .parse()
                .map_err(|_| DurationError::Invalid(input.to_string()))?;
            let denominator = 10u128.pow(digits.len() as u32);
            nanos = numerator
                .checked_mul(scale)
                .map(|scaled| scaled / denominator)
                .and_then(|fraction| nanos.checked_add(fraction))
                .ok_or_else(|| DurationError::Invalid(input.to_string()))?;
        }

        total = total
            .checked_add(nanos)
            .ok_or_else(|| DurationError::Invalid(input.to_string()))?;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC)
        .map_err(|_| DurationError::Invalid(input.to_string()))?;
    let subsec = (total % NANOS_PER_SEC) as u32;
    Ok(Duration::new(secs, subsec))
}
