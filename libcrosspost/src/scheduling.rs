//! Schedule expressions for the command line
//!
//! Requests carry RFC 3339 timestamps. People typing a schedule do not, so
//! the CLI accepts relative durations ("30m", "in 2h") and natural language
//! ("tomorrow", "next monday 10am") as well and turns them into a timestamp.

use chrono::{DateTime, Duration, Utc};

use crate::error::{CrosspostError, Result};
use crate::request::parse_iso8601;

/// Turn a schedule expression into an absolute time.
///
/// Accepted forms, tried in this order:
/// - RFC 3339 or naive ISO 8601 (taken as UTC): "2030-05-01T09:00:00Z"
/// - "now"
/// - durations, optionally prefixed with "in": "30m", "1h 30m", "in 2 days"
/// - natural language: "tomorrow", "next friday 9am"
///
/// # Errors
///
/// Returns `InvalidInput` for empty or unparseable expressions.
pub fn parse_schedule(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CrosspostError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(at) = parse_iso8601(input) {
        return Ok(at);
    }

    if input.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    let relative = input.strip_prefix("in ").map(str::trim).unwrap_or(input);
    if let Some(duration) = parse_duration(relative) {
        return Ok(now + duration);
    }

    chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us).map_err(|e| {
        CrosspostError::InvalidInput(format!("Could not parse schedule '{}': {}", input, e))
    })
}

fn parse_duration(input: &str) -> Option<Duration> {
    let std_duration = humantime::parse_duration(input).ok()?;
    Duration::from_std(std_duration).ok()
}
