use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  DurationRound,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use serde::Deserialize;

/// Milliseconds since the Unix epoch, UTC.
pub type Instant = i64;

const TIMEZONE_CONFIG_FILE: &str =
  "clubdir-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "CLUBDIR_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "CLUBDIR_TIME_CONFIG";
pub const DEFAULT_CIVIL_ZONE: &str =
  "America/Chicago";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Where the civil zone in use came from.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum ZoneSource {
  Explicit,
  Environment,
  Config,
  TimeConfigFile,
  Detected,
  Default
}

impl ZoneSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      | ZoneSource::Explicit => {
        "explicit"
      }
      | ZoneSource::Environment => {
        TIMEZONE_ENV_VAR
      }
      | ZoneSource::Config => "rc",
      | ZoneSource::TimeConfigFile => {
        TIMEZONE_CONFIG_FILE
      }
      | ZoneSource::Detected => {
        "host"
      }
      | ZoneSource::Default => {
        "default"
      }
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct CivilZone {
  pub tz:     Tz,
  pub source: ZoneSource
}

/// Resolves the zone used for every
/// instant to local date conversion.
///
/// An explicit zone wins and must
/// parse. The remaining sources are
/// tried in order and skipped with a
/// logged error when invalid; the
/// deployment default closes the chain.
#[tracing::instrument(skip(configured))]
pub fn resolve_civil_zone(
  explicit: Option<&str>,
  configured: Option<&str>
) -> anyhow::Result<CivilZone> {
  let env_value =
    std::env::var(TIMEZONE_ENV_VAR)
      .ok();
  let file_zone = timezone_config_path()
    .and_then(|path| {
      load_timezone_from_file(&path)
    });

  resolve_with(
    explicit,
    env_value.as_deref(),
    configured,
    file_zone,
    detect_host_zone
  )
}

fn resolve_with<F>(
  explicit: Option<&str>,
  env_value: Option<&str>,
  configured: Option<&str>,
  file_zone: Option<Tz>,
  detect: F
) -> anyhow::Result<CivilZone>
where
  F: FnOnce() -> Option<Tz>
{
  if let Some(raw) = explicit {
    let tz = raw
      .trim()
      .parse::<Tz>()
      .map_err(|err| {
        anyhow!(
          "invalid timezone \
           {raw:?}: {err}"
        )
      })?;
    return Ok(CivilZone {
      tz,
      source: ZoneSource::Explicit
    });
  }

  if let Some(raw) = env_value
    && let Some(tz) =
      parse_timezone(raw, TIMEZONE_ENV_VAR)
  {
    return Ok(CivilZone {
      tz,
      source: ZoneSource::Environment
    });
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "rc")
  {
    return Ok(CivilZone {
      tz,
      source: ZoneSource::Config
    });
  }

  if let Some(tz) = file_zone {
    return Ok(CivilZone {
      tz,
      source:
        ZoneSource::TimeConfigFile
    });
  }

  if let Some(tz) = detect() {
    return Ok(CivilZone {
      tz,
      source: ZoneSource::Detected
    });
  }

  let tz = DEFAULT_CIVIL_ZONE
    .parse::<Tz>()
    .map_err(|err| {
      anyhow!(
        "failed to parse default \
         timezone: {err}"
      )
    })?;
  tracing::warn!(
    timezone = DEFAULT_CIVIL_ZONE,
    "no timezone configured or \
     detected; using deployment \
     default"
  );
  Ok(CivilZone {
    tz,
    source: ZoneSource::Default
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

/// `TZ` first, then the zone the host
/// reports.
fn detect_host_zone() -> Option<Tz> {
  if let Ok(raw) = std::env::var("TZ")
    && let Some(tz) = parse_timezone(
      raw.trim_start_matches(':'),
      "TZ"
    )
  {
    return Some(tz);
  }

  match iana_time_zone::get_timezone() {
    | Ok(name) => {
      parse_timezone(&name, "host")
    }
    | Err(err) => {
      tracing::debug!(
        error = %err,
        "host timezone unavailable"
      );
      None
    }
  }
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
        "resolved civil timezone"
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

pub fn instant_to_utc(
  instant: Instant
) -> anyhow::Result<DateTime<Utc>> {
  DateTime::<Utc>::from_timestamp_millis(
    instant
  )
  .ok_or_else(|| {
    anyhow!(
      "instant out of range: \
       {instant}"
    )
  })
}

pub fn to_zone(
  instant: Instant,
  tz: Tz
) -> anyhow::Result<DateTime<Tz>> {
  Ok(
    instant_to_utc(instant)?
      .with_timezone(&tz)
  )
}

/// The calendar date `instant` falls on
/// in `tz`.
pub fn local_date(
  instant: Instant,
  tz: Tz
) -> anyhow::Result<NaiveDate> {
  Ok(to_zone(instant, tz)?.date_naive())
}

pub fn is_same_date(
  first: Instant,
  second: Instant,
  tz: Tz
) -> anyhow::Result<bool> {
  Ok(
    local_date(first, tz)?
      == local_date(second, tz)?
  )
}

fn to_utc_from_local(
  local_naive: NaiveDateTime,
  tz: Tz,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime {local_naive} \
         does not exist in {tz}: \
         {context}"
      ))
    }
  }
}

/// Parses a wall-clock `YYYY-MM-DD
/// HH:MM` (or `T` separated) time in
/// `tz` into an instant.
#[tracing::instrument(skip(tz))]
pub fn parse_local_datetime(
  input: &str,
  tz: Tz
) -> anyhow::Result<Instant> {
  let token = input.trim();
  for fmt in
    ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Ok(
        to_utc_from_local(ndt, tz, fmt)?
          .timestamp_millis()
      );
    }
  }

  Err(anyhow!(
    "unrecognized local datetime: \
     {input}"
  ))
  .context(
    "expected YYYY-MM-DD HH:MM or \
     YYYY-MM-DDTHH:MM"
  )
}

/// Date and time fields as an edit
/// form shows them.
#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct DateAndTime {
  pub date: String,
  pub time: String
}

pub fn millis_to_date_and_time(
  instant: Instant,
  tz: Tz
) -> anyhow::Result<DateAndTime> {
  let local = to_zone(instant, tz)?;
  Ok(DateAndTime {
    date: local
      .format("%Y-%m-%d")
      .to_string(),
    time: local
      .format("%H:%M")
      .to_string()
  })
}

/// Next whole local hour after `now`,
/// one hour later again for an end.
fn next_whole_hour(
  now: DateTime<Utc>,
  tz: Tz,
  end: bool
) -> anyhow::Result<NaiveDateTime> {
  let local =
    now.with_timezone(&tz).naive_local();
  let hours = if end { 2 } else { 1 };
  local
    .duration_trunc(Duration::hours(1))
    .map_err(|err| {
      anyhow!(
        "cannot round {local} to the \
         hour: {err}"
      )
    })?
    .checked_add_signed(Duration::hours(
      hours
    ))
    .ok_or_else(|| {
      anyhow!(
        "default time after {local} is \
         out of range"
      )
    })
}

/// Date part of the default start (or
/// end) time, `YYYY-MM-DD`.
pub fn default_edit_date(
  now: DateTime<Utc>,
  tz: Tz,
  end: bool
) -> anyhow::Result<String> {
  Ok(
    next_whole_hour(now, tz, end)?
      .format("%Y-%m-%d")
      .to_string()
  )
}

/// Time part of the default start (or
/// end) time, `HH:MM`.
pub fn default_edit_time(
  now: DateTime<Utc>,
  tz: Tz,
  end: bool
) -> anyhow::Result<String> {
  Ok(
    next_whole_hour(now, tz, end)?
      .format("%H:%M")
      .to_string()
  )
}

/// Parses `MMM D, YYYY` (full month
/// names are accepted as well).
pub fn parse_date_input(
  input: &str
) -> anyhow::Result<NaiveDate> {
  NaiveDate::parse_from_str(
    input.trim(),
    "%b %d, %Y"
  )
  .with_context(|| {
    format!(
      "invalid date {input:?}; \
       expected e.g. Feb 1, 2024"
    )
  })
}

/// Normalizes loose date input (`Feb 1,
/// 2024`, `February 1, 2024`, `2024`,
/// `march`) to `MMM D, YYYY`.
pub fn guess_date_input(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<String> {
  let token = input.trim();

  let date = if let Ok(date) =
    parse_date_input(token)
  {
    date
  } else if token.len() == 4
    && token
      .chars()
      .all(|c| c.is_ascii_digit())
  {
    let year: i32 =
      token.parse().context(
        "invalid 4-digit year"
      )?;
    NaiveDate::from_ymd_opt(year, 1, 1)
      .ok_or_else(|| {
        anyhow!(
          "invalid year value: {year}"
        )
      })?
  } else if let Some(month) =
    parse_month_name(
      &token.to_ascii_lowercase()
    )
  {
    NaiveDate::from_ymd_opt(
      today.year(),
      month,
      1
    )
    .ok_or_else(|| {
      anyhow!(
        "invalid month value: {month}"
      )
    })?
  } else {
    return Err(anyhow!(
      "unrecognized date input: \
       {input}"
    ));
  };

  Ok(
    date
      .format("%b %-d, %Y")
      .to_string()
  )
}

fn parse_month_name(
  token: &str
) -> Option<u32> {
  match token.trim() {
    | "january" | "jan" => Some(1),
    | "february" | "feb" => Some(2),
    | "march" | "mar" => Some(3),
    | "april" | "apr" => Some(4),
    | "may" => Some(5),
    | "june" | "jun" => Some(6),
    | "july" | "jul" => Some(7),
    | "august" | "aug" => Some(8),
    | "september" | "sep" | "sept" => {
      Some(9)
    }
    | "october" | "oct" => Some(10),
    | "november" | "nov" => Some(11),
    | "december" | "dec" => Some(12),
    | _ => None
  }
}
