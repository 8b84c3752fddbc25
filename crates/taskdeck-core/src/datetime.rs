use anyhow::anyhow;
use chrono::{
  DateTime,
  Days,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  SecondsFormat,
  TimeZone,
  Utc
};
use chrono_tz::Tz;

use crate::config::Config;

const TIMEZONE_ENV_VAR: &str =
  "TASKDECK_TIMEZONE";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Resolves the zone used for date
/// boundaries. The environment wins
/// over `time.zone`; anything
/// unparseable falls back to UTC.
pub fn resolve_timezone(
  cfg: &Config
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(raw) = cfg.get("time.zone")
    && let Some(tz) =
      parse_timezone(&raw, "time.zone")
  {
    return tz;
  }

  chrono_tz::UTC
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Accepts `YYYY-MM-DD` or a full
/// RFC 3339 timestamp (its calendar
/// date is kept).
#[must_use]
pub fn parse_date(
  input: &str
) -> Option<NaiveDate> {
  let token = input.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token,
      DATE_FORMAT
    )
  {
    return Some(date);
  }

  DateTime::parse_from_rfc3339(token)
    .ok()
    .map(|dt| dt.date_naive())
}

#[must_use]
pub fn format_date(
  date: NaiveDate
) -> String {
  date.format(DATE_FORMAT).to_string()
}

/// ISO-8601 with offset and
/// millisecond precision.
#[must_use]
pub fn format_instant<Z>(
  dt: &DateTime<Z>
) -> String
where
  Z: TimeZone,
  Z::Offset: std::fmt::Display
{
  dt.to_rfc3339_opts(
    SecondsFormat::Millis,
    false
  )
}

pub fn start_of_day(
  date: NaiveDate,
  tz: &Tz
) -> anyhow::Result<DateTime<Tz>> {
  let midnight = date
    .and_hms_opt(0, 0, 0)
    .ok_or_else(|| {
      anyhow!("invalid date {date}")
    })?;
  zoned(midnight, tz)
}

/// Last representable millisecond of
/// `date`: the next day's start minus
/// one millisecond.
pub fn end_of_day(
  date: NaiveDate,
  tz: &Tz
) -> anyhow::Result<DateTime<Tz>> {
  let next = date
    .checked_add_days(Days::new(1))
    .ok_or_else(|| {
      anyhow!(
        "date out of range: {date}"
      )
    })?;
  Ok(
    start_of_day(next, tz)?
      - Duration::milliseconds(1)
  )
}

/// Parses a deadline typed by a user:
/// RFC 3339, `YYYY-MM-DD HH:MM`,
/// `YYYY-MM-DDTHH:MM` or a bare date
/// (start of that day).
pub fn parse_deadline(
  input: &str,
  tz: &Tz
) -> anyhow::Result<DateTime<Tz>> {
  let token = input.trim();
  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(tz));
  }

  for fmt in
    ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
  {
    if let Ok(naive) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return zoned(naive, tz);
    }
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token,
      DATE_FORMAT
    )
  {
    return start_of_day(date, tz);
  }

  Err(anyhow!(
    "unrecognized deadline: {input}"
  ))
}

pub fn parse_instant(
  input: &str
) -> anyhow::Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(
    input.trim()
  )
  .map(|dt| dt.with_timezone(&Utc))
  .map_err(|err| {
    anyhow!(
      "invalid timestamp {input}: {err}"
    )
  })
}

fn zoned(
  local_naive: NaiveDateTime,
  tz: &Tz
) -> anyhow::Result<DateTime<Tz>> {
  match tz.from_local_datetime(
    &local_naive
  ) {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt)
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      Ok(if first <= second {
        first
      } else {
        second
      })
    }
    | LocalResult::None => {
      // Skipped by a DST jump; the
      // first instant after the gap
      // is the one the wall clock
      // shows.
      let shifted =
        local_naive + Duration::hours(1);
      match tz
        .from_local_datetime(&shifted)
        .earliest()
      {
        | Some(dt) => Ok(dt),
        | None => {
          Err(anyhow!(
            "local datetime does not \
             exist in {}: {}",
            tz.name(),
            local_naive
          ))
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .unwrap()
  }

  #[test]
  fn end_of_day_is_last_millisecond() {
    let end = end_of_day(
      day(2024, 6, 1),
      &chrono_tz::UTC
    )
    .unwrap();
    assert_eq!(
      format_instant(&end),
      "2024-06-01T23:59:59.999+00:00"
    );
  }

  #[test]
  fn day_bounds_carry_the_zone_offset()
  {
    let tz: Tz =
      "Asia/Ho_Chi_Minh".parse().unwrap();
    let start =
      start_of_day(day(2024, 6, 1), &tz)
        .unwrap();
    let end =
      end_of_day(day(2024, 6, 1), &tz)
        .unwrap();
    assert_eq!(
      format_instant(&start),
      "2024-06-01T00:00:00.000+07:00"
    );
    assert_eq!(
      format_instant(&end),
      "2024-06-01T23:59:59.999+07:00"
    );
  }

  #[test]
  fn end_of_day_spans_dst_change() {
    let tz: Tz =
      "America/New_York".parse().unwrap();
    let end =
      end_of_day(day(2024, 3, 10), &tz)
        .unwrap();
    assert_eq!(
      format_instant(&end),
      "2024-03-10T23:59:59.999-04:00"
    );
  }

  #[test]
  fn parse_date_accepts_plain_and_rfc3339()
   {
    assert_eq!(
      parse_date("2024-02-29"),
      Some(day(2024, 2, 29))
    );
    assert_eq!(
      parse_date(
        "2024-02-29T18:00:00+02:00"
      ),
      Some(day(2024, 2, 29))
    );
    assert_eq!(parse_date("2023-02-29"), None);
    assert_eq!(parse_date("tomorrow"), None);
    assert_eq!(parse_date(""), None);
  }

  #[test]
  fn deadline_formats() {
    let tz = chrono_tz::UTC;
    assert_eq!(
      format_instant(
        &parse_deadline(
          "2024-06-01 14:30",
          &tz
        )
        .unwrap()
      ),
      "2024-06-01T14:30:00.000+00:00"
    );
    assert_eq!(
      format_instant(
        &parse_deadline("2024-06-01", &tz)
          .unwrap()
      ),
      "2024-06-01T00:00:00.000+00:00"
    );
    assert!(
      parse_deadline("next week", &tz)
        .is_err()
    );
  }
}
