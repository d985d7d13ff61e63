use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// Parses the date formats accepted by `before:` and `after:` filters.
///
/// Supports RFC 3339, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, `now`, `today`,
/// `yesterday` and relative expressions such as `3 weeks ago`.
pub fn parse_git_date(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let value = value.trim();
    let lower = value.to_ascii_lowercase();

    match lower.as_str() {
        "now" => return Ok(now),
        "today" => return Ok(start_of_day(now)),
        "yesterday" => return Ok(start_of_day(now) - Duration::days(1)),
        _ => {}
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(ts.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }

    if let Some(rest) = lower.strip_suffix("ago") {
        let span = parse_relative_span(rest)
            .with_context(|| format!("invalid relative date '{value}'"))?;
        return Ok(now - span);
    }

    bail!("unrecognized date '{value}'")
}

fn start_of_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_time(chrono::NaiveTime::MIN).and_utc()
}

// "1 year 2 months" -> "1year 2months", the form humantime expects.
fn parse_relative_span(raw: &str) -> Result<Duration> {
    let mut compact = String::new();
    for token in raw.split_whitespace() {
        let starts_number = token.starts_with(|c: char| c.is_ascii_digit());
        if starts_number && !compact.is_empty() {
            compact.push(' ');
        }
        compact.push_str(token);
    }
    if compact.is_empty() {
        bail!("missing duration");
    }

    let span = humantime::parse_duration(&compact)?;
    Ok(Duration::from_std(span)?)
}
