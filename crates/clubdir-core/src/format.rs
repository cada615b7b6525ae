use chrono::{DateTime, Datelike, Months, Utc};
use chrono_tz::Tz;

use crate::datetime::{Instant, is_same_date, to_zone};
use crate::event::EventRecord;

const CLOCK_FORMAT: &str = "%-I:%M%P";
const DATE_WITH_WEEKDAY: &str = "%A · %B %-d, %Y";
const DATE_WITHOUT_WEEKDAY: &str = "%B %-d, %Y";
const FULL_DATE: &str = "%A, %B %-d, %Y";

fn clock(instant: Instant, tz: Tz) -> anyhow::Result<String> {
    Ok(to_zone(instant, tz)?.format(CLOCK_FORMAT).to_string())
}

/// `h:mma` start time, followed by ` - ` and the end time for ranged events.
///
/// Point events never show a range even when they carry an end.
pub fn format_time(event: &EventRecord, tz: Tz) -> anyhow::Result<String> {
    let start = clock(event.start, tz)?;
    if event.is_ranged() {
        Ok(format!("{start} - {}", clock(event.end_or_start(), tz)?))
    } else {
        Ok(start)
    }
}

/// Start time only, as calendar cells show it.
pub fn format_start_time(event: &EventRecord, tz: Tz) -> anyhow::Result<String> {
    clock(event.start, tz)
}

pub fn format_date(event: &EventRecord, tz: Tz, include_weekday: bool) -> anyhow::Result<String> {
    let fmt = if include_weekday {
        DATE_WITH_WEEKDAY
    } else {
        DATE_WITHOUT_WEEKDAY
    };
    Ok(to_zone(event.start, tz)?.format(fmt).to_string())
}

/// Full start date, plus the end date when the event runs past its start day.
pub fn format_event_date(event: &EventRecord, tz: Tz) -> anyhow::Result<String> {
    let mut out = to_zone(event.start, tz)?.format(FULL_DATE).to_string();
    let end = event.end_or_start();
    if !is_same_date(event.start, end, tz)? {
        out.push_str(" - ");
        out.push_str(&to_zone(end, tz)?.format(FULL_DATE).to_string());
    }
    Ok(out)
}

/// Relative age such as `3 days ago`, using the largest non-zero unit.
pub fn calculate_edit_date(edited: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let (diff, unit) = edit_age(edited, now);
    let plural = if diff == 1 { "" } else { "s" };
    format!("{diff} {unit}{plural} ago")
}

fn edit_age(edited: DateTime<Utc>, now: DateTime<Utc>) -> (i64, &'static str) {
    let months = whole_months_between(edited, now);
    let elapsed = now - edited;

    let candidates = [
        (months / 12, "year"),
        (months, "month"),
        (elapsed.num_days(), "day"),
        (elapsed.num_hours(), "hour"),
    ];
    for (diff, unit) in candidates {
        if diff > 0 {
            return (diff, unit);
        }
    }
    (elapsed.num_minutes(), "minute")
}

fn whole_months_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    if to <= from {
        return 0;
    }
    let mut months = i64::from(to.year() - from.year()) * 12 + i64::from(to.month())
        - i64::from(from.month());
    let anniversary = u32::try_from(months)
        .ok()
        .and_then(|m| from.checked_add_months(Months::new(m)));
    if anniversary.is_none_or(|at| at > to) {
        months -= 1;
    }
    months.max(0)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use chrono_tz::America::Chicago;

    use super::*;
    use crate::datetime::parse_local_datetime;
    use crate::event::EventKind;

    fn at(local: &str) -> Instant {
        parse_local_datetime(local, Chicago).expect("valid local time")
    }

    fn ranged(start: &str, end: &str) -> EventRecord {
        let mut event = EventRecord::new("Chess Club".to_string(), "Open Play".to_string(), at(start));
        event.end = Some(at(end));
        event.kind = EventKind::Event;
        event
    }

    #[test]
    fn ranged_event_shows_both_times() {
        let event = ranged("2024-01-01 10:00", "2024-01-01 14:00");
        assert_eq!(
            format_time(&event, Chicago).expect("format"),
            "10:00am - 2:00pm"
        );
        assert_eq!(format_start_time(&event, Chicago).expect("format"), "10:00am");
    }

    #[test]
    fn point_event_ignores_end() {
        let mut event = ranged("2024-01-01 09:05", "2024-01-01 17:00");
        event.kind = EventKind::Point;
        assert_eq!(format_time(&event, Chicago).expect("format"), "9:05am");
    }

    #[test]
    fn zero_length_event_shows_single_time() {
        let event = ranged("2024-01-01 12:00", "2024-01-01 12:00");
        assert_eq!(format_time(&event, Chicago).expect("format"), "12:00pm");
    }

    #[test]
    fn time_is_zone_corrected() {
        let event = ranged("2024-01-01 10:00", "2024-01-01 14:00");
        assert_eq!(
            format_time(&event, chrono_tz::UTC).expect("format"),
            "4:00pm - 8:00pm"
        );
    }

    #[test]
    fn date_with_and_without_weekday() {
        let event = ranged("2024-02-01 18:00", "2024-02-01 19:00");
        assert_eq!(
            format_date(&event, Chicago, true).expect("format"),
            "Thursday · February 1, 2024"
        );
        assert_eq!(
            format_date(&event, Chicago, false).expect("format"),
            "February 1, 2024"
        );
    }

    #[test]
    fn multi_day_event_date_spans() {
        let same_day = ranged("2024-02-01 18:00", "2024-02-01 19:00");
        assert_eq!(
            format_event_date(&same_day, Chicago).expect("format"),
            "Thursday, February 1, 2024"
        );

        let retreat = ranged("2024-02-02 17:00", "2024-02-04 12:00");
        assert_eq!(
            format_event_date(&retreat, Chicago).expect("format"),
            "Friday, February 2, 2024 - Sunday, February 4, 2024"
        );
    }

    #[test]
    fn edit_date_uses_largest_unit() {
        let now = Utc
            .with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
            .single()
            .expect("valid now");

        assert_eq!(calculate_edit_date(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(calculate_edit_date(now - Duration::hours(5), now), "5 hours ago");
        assert_eq!(calculate_edit_date(now - Duration::days(3), now), "3 days ago");
        assert_eq!(calculate_edit_date(now - Duration::days(40), now), "1 month ago");
        assert_eq!(calculate_edit_date(now - Duration::days(800), now), "2 years ago");
        assert_eq!(calculate_edit_date(now, now), "0 minutes ago");
    }
}
