use crate::error::ReminderError;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};

/// Parse a reminder time relative to `now` and require it to be in the future.
///
/// Accepted forms: `90s`, `15m`, `2h`, `1d`, `1w`, compounds like `1h30m`,
/// an optional `in ` prefix, RFC 3339, `YYYY-MM-DD HH:MM` (UTC) and
/// `HH:MM` (next occurrence, UTC).
pub fn parse_reminder_time(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ReminderError> {
    let when = parse_time(input.trim(), now)
        .ok_or_else(|| ReminderError::InvalidTime(input.to_string()))?;
    if when <= now {
        return Err(ReminderError::NotInFuture(when.to_rfc3339()));
    }
    Ok(when)
}

fn parse_time(input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if input.is_empty() {
        return None;
    }
    if let Some(offset) = parse_relative(input) {
        return now.checked_add_signed(offset);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return Some(naive.and_utc());
    }
    if let Ok(time) = NaiveTime::parse_from_str(input, "%H:%M") {
        let today = now.date_naive().and_time(time).and_utc();
        return if today > now {
            Some(today)
        } else {
            today.checked_add_signed(Duration::days(1))
        };
    }
    None
}

/// `1h30m` style offsets. Every number needs a unit; zero is rejected.
fn parse_relative(input: &str) -> Option<Duration> {
    let text = input.strip_prefix("in ").unwrap_or(input).trim();
    if text.is_empty() {
        return None;
    }

    let mut total = Duration::zero();
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if c.is_whitespace() {
            continue;
        }
        let amount: i64 = digits.parse().ok()?;
        digits.clear();
        let unit = match c.to_ascii_lowercase() {
            's' => Duration::try_seconds(amount)?,
            'm' => Duration::try_minutes(amount)?,
            'h' => Duration::try_hours(amount)?,
            'd' => Duration::try_days(amount)?,
            'w' => Duration::try_weeks(amount)?,
            _ => return None,
        };
        total = total.checked_add(&unit)?;
    }

    if !digits.is_empty() || total <= Duration::zero() {
        return None;
    }
    Some(total)
}
