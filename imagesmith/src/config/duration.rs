//! Duration strings such as `90s`, `5m` or `1h30m`.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").unwrap_or_else(|e| panic!("invalid duration pattern: {e}"))
    })
}

/// Parses an hours/minutes/seconds duration string.
///
/// # Errors
///
/// Returns a message describing why the string was rejected.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration is empty".to_string());
    }
    let captures = pattern()
        .captures(input)
        .ok_or_else(|| format!("invalid duration '{input}', expected e.g. 90s, 5m or 1h30m"))?;

    let mut seconds: u64 = 0;
    for (index, unit) in [(1, 3600u64), (2, 60), (3, 1)] {
        if let Some(m) = captures.get(index) {
            let value: u64 = m
                .as_str()
                .parse()
                .map_err(|e| format!("invalid duration '{input}': {e}"))?;
            seconds = value
                .checked_mul(unit)
                .and_then(|v| seconds.checked_add(v))
                .ok_or_else(|| format!("duration '{input}' is too large"))?;
        }
    }
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_units() {
        assert_eq!(parse_duration("90s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
    }

    #[test]
    fn test_parse_combined() {
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration(" 0s "), Ok(Duration::ZERO));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("30s5m").is_err());
        assert!(parse_duration("ten minutes").is_err());
    }
}
