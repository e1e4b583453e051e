use std::time::Duration;

use anyhow::{anyhow, bail, ensure};

/// Parses a string duration & return it as [Duration].
///
/// Accepts one or more `<integer><unit>` terms, optionally separated by
/// whitespace, with units `ms`, `s`, `m`/`min` and `h`: `60s`, `500ms`,
/// `5min`, `1m30s`, `1h 15m`.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    ensure!(!s.is_empty(), "Duration cannot be empty");

    let mut rest = s;
    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let split_index =
            rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(|| anyhow!("Missing duration suffix in: {}", s))?;
        let (value_str, tail) = rest.split_at(split_index);
        let value: u64 = value_str.parse().map_err(|_| anyhow!("Invalid duration value in: {}", s))?;

        let tail = tail.trim_start();
        let unit_len = tail.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(tail.len());
        let (suffix, tail) = tail.split_at(unit_len);

        let term = match suffix {
            "ms" => Some(Duration::from_millis(value)),
            "s" => Some(Duration::from_secs(value)),
            "m" | "min" => value.checked_mul(60).map(Duration::from_secs),
            "h" => value.checked_mul(60 * 60).map(Duration::from_secs),
            _ => bail!("Invalid duration suffix: {:?}. Expected 'ms', 's', 'm', 'min' or 'h'.", suffix),
        };
        total = term
            .and_then(|term| total.checked_add(term))
            .ok_or_else(|| anyhow!("Duration is too large: {}", s))?;
        rest = tail.trim_start();
    }

    Ok(total)
}
