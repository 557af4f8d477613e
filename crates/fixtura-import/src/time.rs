//! Relative time expressions for the `rel` custom transform.
//!
//! Accepted forms: `now`, `+3 days`, `-2h`, `5 minutes ago`, `in 1 week`,
//! `2 months from now`.

use chrono::{DateTime, Months, SecondsFormat, TimeDelta, Utc};

use crate::errors::{ImportError, ImportResult};

/// Resolves `input` against `now`.
pub fn relative_time(input: &str, now: DateTime<Utc>) -> ImportResult<DateTime<Utc>> {
    let text = input.trim().to_lowercase();
    if text == "now" {
        return Ok(now);
    }

    let (mut sign, body) = if let Some(rest) = text.strip_suffix(" ago") {
        (-1, rest.trim())
    } else if let Some(rest) = text.strip_suffix(" from now") {
        (1, rest.trim())
    } else if let Some(rest) = text.strip_prefix("in ") {
        (1, rest.trim())
    } else {
        (1, text.as_str())
    };
    let body = if let Some(rest) = body.strip_prefix('-') {
        sign = -sign;
        rest.trim_start()
    } else {
        body.strip_prefix('+').unwrap_or(body).trim_start()
    };

    let digits = body.chars().take_while(char::is_ascii_digit).count();
    let (amount, unit) = body.split_at(digits);
    let amount: i64 = amount.parse().map_err(|_| invalid(input))?;
    let amount = amount.checked_mul(sign).ok_or_else(|| invalid(input))?;

    let shifted = match unit.trim() {
        "s" | "sec" | "secs" | "second" | "seconds" => shift_by(now, TimeDelta::try_seconds(amount)),
        "m" | "min" | "mins" | "minute" | "minutes" => shift_by(now, TimeDelta::try_minutes(amount)),
        "h" | "hr" | "hrs" | "hour" | "hours" => shift_by(now, TimeDelta::try_hours(amount)),
        "d" | "day" | "days" => shift_by(now, TimeDelta::try_days(amount)),
        "w" | "wk" | "wks" | "week" | "weeks" => shift_by(now, TimeDelta::try_weeks(amount)),
        "mo" | "month" | "months" => shift_months(now, amount),
        "y" | "yr" | "yrs" | "year" | "years" => shift_months(now, amount.saturating_mul(12)),
        _ => return Err(invalid(input)),
    };
    shifted.ok_or_else(|| invalid(input))
}

/// RFC 3339 rendering used for stored timestamps.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `None` when the amount does not fit a `TimeDelta` or the result leaves
/// the representable range.
fn shift_by(now: DateTime<Utc>, delta: Option<TimeDelta>) -> Option<DateTime<Utc>> {
    now.checked_add_signed(delta?)
}

fn shift_months(now: DateTime<Utc>, amount: i64) -> Option<DateTime<Utc>> {
    let months = Months::new(u32::try_from(amount.unsigned_abs()).ok()?);
    if amount < 0 {
        now.checked_sub_months(months)
    } else {
        now.checked_add_months(months)
    }
}

fn invalid(input: &str) -> ImportError {
    ImportError::Transform {
        name: "rel".to_string(),
        message: format!("cannot parse relative time `{input}`"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).single().expect("valid date")
    }

    #[test]
    fn parses_signed_short_forms() {
        assert_eq!(relative_time("now", now()).expect("now"), now());
        assert_eq!(
            relative_time("-2d", now()).expect("days"),
            Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).single().expect("date")
        );
        assert_eq!(
            relative_time("+3h", now()).expect("hours"),
            Utc.with_ymd_and_hms(2024, 3, 15, 15, 0, 0).single().expect("date")
        );
    }

    #[test]
    fn parses_phrases() {
        assert_eq!(
            relative_time("5 minutes ago", now()).expect("ago"),
            Utc.with_ymd_and_hms(2024, 3, 15, 11, 55, 0).single().expect("date")
        );
        assert_eq!(
            relative_time("in 1 week", now()).expect("in"),
            Utc.with_ymd_and_hms(2024, 3, 22, 12, 0, 0).single().expect("date")
        );
        assert_eq!(
            relative_time("1 year from now", now()).expect("year"),
            Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).single().expect("date")
        );
        assert_eq!(
            relative_time("2 months ago", now()).expect("months"),
            Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).single().expect("date")
        );
    }

    #[test]
    fn rejects_unknown_units() {
        assert!(matches!(
            relative_time("3 fortnights", now()),
            Err(ImportError::Transform { name, .. }) if name == "rel"
        ));
        assert!(relative_time("soon", now()).is_err());
        assert!(relative_time("+200000000000d", now()).is_err());
        assert!(relative_time("-200000000000w", now()).is_err());
        assert!(relative_time("+9223372036854775s", now()).is_err());
        assert!(relative_time("99999999999 years ago", now()).is_err());
    }

    #[test]
    fn formats_as_utc_rfc3339() {
        assert_eq!(format_timestamp(now()), "2024-03-15T12:00:00.000Z");
    }
}
