use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  Datelike,
  Days,
  Months,
  NaiveDate,
  Weekday
};

use crate::datetime::parse_date_input;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum WeekStart {
  #[default]
  Sunday,
  Monday
}

impl WeekStart {
  #[must_use]
  pub fn weekday(self) -> Weekday {
    match self {
      | WeekStart::Sunday => Weekday::Sun,
      | WeekStart::Monday => Weekday::Mon
    }
  }

  /// Column of `day` in a grid whose
  /// weeks begin on `self`.
  #[must_use]
  pub fn index_of(
    self,
    day: Weekday
  ) -> u32 {
    match self {
      | WeekStart::Sunday => {
        day.num_days_from_sunday()
      }
      | WeekStart::Monday => {
        day.num_days_from_monday()
      }
    }
  }
}

impl FromStr for WeekStart {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "sunday" | "sun" => {
        Ok(WeekStart::Sunday)
      }
      | "monday" | "mon" => {
        Ok(WeekStart::Monday)
      }
      | other => {
        Err(anyhow!(
          "invalid week start: \
           {other} (expected sunday \
           or monday)"
        ))
      }
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum GridMonth {
  Previous,
  Current,
  Next
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct GridCell {
  pub day:   u32,
  pub month: GridMonth
}

impl GridCell {
  /// The calendar date this cell shows,
  /// given the grid's reference month.
  ///
  /// `None` for spillover cells that
  /// fall outside chrono's date range.
  #[must_use]
  pub fn date(
    &self,
    reference: NaiveDate
  ) -> Option<NaiveDate> {
    let month_start =
      first_day_of_month(reference);
    let anchor = match self.month {
      | GridMonth::Previous => {
        shift_months(month_start, -1)?
      }
      | GridMonth::Current => {
        month_start
      }
      | GridMonth::Next => {
        shift_months(month_start, 1)?
      }
    };
    anchor.with_day(self.day)
  }
}

/// Day numbers for a 7-column month
/// view: the spillover of the previous
/// month, the month itself, and the
/// spillover of the next month.
#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct CalendarGrid {
  pub previous:   Vec<u32>,
  pub current:    Vec<u32>,
  pub next:       Vec<u32>,
  pub reference:  NaiveDate,
  pub week_start: WeekStart
}

impl CalendarGrid {
  #[must_use]
  pub fn len(&self) -> usize {
    self.previous.len()
      + self.current.len()
      + self.next.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  #[must_use]
  pub fn title(&self) -> String {
    self
      .reference
      .format("%B %Y")
      .to_string()
  }

  pub fn cells(
    &self
  ) -> impl Iterator<Item = GridCell> + '_
  {
    let tag = |month: GridMonth| {
      move |day: &u32| GridCell {
        day: *day,
        month
      }
    };

    self
      .previous
      .iter()
      .map(tag(GridMonth::Previous))
      .chain(
        self
          .current
          .iter()
          .map(tag(GridMonth::Current))
      )
      .chain(
        self
          .next
          .iter()
          .map(tag(GridMonth::Next))
      )
  }

  #[must_use]
  pub fn weeks(
    &self
  ) -> Vec<Vec<GridCell>> {
    self
      .cells()
      .collect::<Vec<_>>()
      .chunks(7)
      .map(<[GridCell]>::to_vec)
      .collect()
  }
}

/// Builds the grid for the month
/// containing `reference`.
///
/// Spillover day numbers come from
/// month lengths alone, so months at
/// the edge of chrono's range still
/// get whole weeks.
#[must_use]
pub fn build(
  reference: NaiveDate,
  week_start: WeekStart
) -> CalendarGrid {
  let first =
    first_day_of_month(reference);
  let year = first.year();
  let month = first.month();
  let length =
    days_in_month(year, month);

  let current =
    (1..=length).collect::<Vec<_>>();

  let lead =
    week_start.index_of(first.weekday());
  let prior_length =
    previous_month_length(year, month);
  let previous = (0..lead)
    .rev()
    .map(|back| prior_length - back)
    .collect::<Vec<_>>();

  let last_column =
    (lead + length - 1) % 7;
  let next = (1..=6 - last_column)
    .collect::<Vec<_>>();

  tracing::trace!(
    reference = %reference,
    previous = previous.len(),
    current = current.len(),
    next = next.len(),
    "built calendar grid"
  );

  CalendarGrid {
    previous,
    current,
    next,
    reference: first,
    week_start
  }
}

/// Picks the reference month from
/// `date_input` (`MMM D, YYYY`) or
/// `today`, moves it by
/// `offset_months`, and builds its grid.
pub fn generate(
  today: NaiveDate,
  offset_months: i32,
  date_input: &str,
  week_start: WeekStart
) -> anyhow::Result<CalendarGrid> {
  let base = if date_input.trim().is_empty()
  {
    today
  } else {
    parse_date_input(date_input)?
  };

  let target = shift_months(
    first_day_of_month(base),
    offset_months
  )
  .ok_or_else(|| {
    anyhow!(
      "month offset {offset_months} \
       from {base} is out of range"
    )
  })?;
  Ok(build(target, week_start))
}

/// Short weekday labels in display
/// order.
#[must_use]
pub fn weekday_labels(
  week_start: WeekStart
) -> Vec<&'static str> {
  match week_start {
    | WeekStart::Sunday => {
      vec![
        "Sun", "Mon", "Tue", "Wed",
        "Thu", "Fri", "Sat",
      ]
    }
    | WeekStart::Monday => {
      vec![
        "Mon", "Tue", "Wed", "Thu",
        "Fri", "Sat", "Sun",
      ]
    }
  }
}

/// Moves `date` by whole months,
/// clamping the day to the target
/// month's length.
#[must_use]
pub fn shift_months(
  date: NaiveDate,
  months: i32
) -> Option<NaiveDate> {
  let step =
    Months::new(months.unsigned_abs());
  if months >= 0 {
    date.checked_add_months(step)
  } else {
    date.checked_sub_months(step)
  }
}

/// The 1st of `date`'s month. Every
/// month holding a valid date is fully
/// inside chrono's range.
#[must_use]
pub fn first_day_of_month(
  date: NaiveDate
) -> NaiveDate {
  date
    - Days::new(u64::from(date.day0()))
}

#[must_use]
pub fn last_day_of_month(
  date: NaiveDate
) -> NaiveDate {
  let first = first_day_of_month(date);
  first
    + Days::new(u64::from(
      days_in_month(
        first.year(),
        first.month()
      ) - 1
    ))
}

/// Length of a proleptic Gregorian
/// month (`month` is 1-based).
#[must_use]
pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  month_length(i64::from(year), month)
}

fn month_length(
  year: i64,
  month: u32
) -> u32 {
  match month {
    | 2 if is_leap_year(year) => 29,
    | 2 => 28,
    | 4 | 6 | 9 | 11 => 30,
    | _ => 31
  }
}

fn previous_month_length(
  year: i32,
  month: u32
) -> u32 {
  if month <= 1 {
    month_length(i64::from(year) - 1, 12)
  } else {
    month_length(
      i64::from(year),
      month - 1
    )
  }
}

fn is_leap_year(year: i64) -> bool {
  year % 4 == 0
    && (year % 100 != 0
      || year % 400 == 0)
}
