use std::collections::BTreeSet;
use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::calendar::{CalendarGrid, GridMonth, weekday_labels};
use crate::config::Config;
use crate::event::EventRecord;
use crate::datetime::{instant_to_utc, local_date};
use crate::format::{
    calculate_edit_date, format_date, format_event_date, format_start_time, format_time,
};
use crate::links::{TextSegment, parse_links};
use crate::schedule::ScheduleEntry;

const CELL_WIDTH: usize = 4;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.color()? && io::stdout().is_terminal();
        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, grid, marked))]
    pub fn print_calendar(
        &mut self,
        grid: &CalendarGrid,
        marked: &BTreeSet<NaiveDate>,
        today: Option<NaiveDate>,
    ) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_calendar(out, grid, marked, today)
    }

    /// Days of other months are dimmed, days with events carry a `*`.
    pub fn write_calendar<W: Write>(
        &self,
        mut out: W,
        grid: &CalendarGrid,
        marked: &BTreeSet<NaiveDate>,
        today: Option<NaiveDate>,
    ) -> anyhow::Result<()> {
        let title = grid.title();
        let total_width = CELL_WIDTH * 7;
        let pad = total_width.saturating_sub(UnicodeWidthStr::width(title.as_str())) / 2;
        writeln!(out, "{}{}", " ".repeat(pad), title)?;

        for label in weekday_labels(grid.week_start) {
            write!(out, "{label:>width$}", width = CELL_WIDTH)?;
        }
        writeln!(out)?;

        for week in grid.weeks() {
            for cell in week {
                let date = cell.date(grid.reference);
                let marker = if date.is_some_and(|day| marked.contains(&day)) {
                    "*"
                } else {
                    " "
                };
                let text = format!("{:>width$}{marker}", cell.day, width = CELL_WIDTH - 1);
                let text = if cell.month != GridMonth::Current {
                    self.paint(&text, "90")
                } else if date.is_some() && date == today {
                    self.paint(&text, "7")
                } else {
                    text
                };
                write!(out, "{text}")?;
            }
            writeln!(out)?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, events))]
    pub fn print_month_events(&mut self, events: &[EventRecord], tz: Tz) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_month_events(out, events, tz)
    }

    /// One row per event under the grid: short date, start time, club, name.
    pub fn write_month_events<W: Write>(
        &self,
        mut out: W,
        events: &[EventRecord],
        tz: Tz,
    ) -> anyhow::Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        writeln!(out)?;
        let mut rows = Vec::with_capacity(events.len());
        for event in events {
            rows.push(vec![
                local_date(event.start, tz)?.format("%b %-d").to_string(),
                format_start_time(event, tz)?,
                self.paint(&event.club, "33"),
                event.name.clone(),
            ]);
        }
        write_rows(&mut out, rows)
    }

    #[tracing::instrument(skip(self, entries))]
    pub fn print_schedule(&mut self, entries: &[ScheduleEntry], tz: Tz) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_schedule(out, entries, tz)
    }

    pub fn write_schedule<W: Write>(
        &self,
        mut out: W,
        entries: &[ScheduleEntry],
        tz: Tz,
    ) -> anyhow::Result<()> {
        if entries.is_empty() {
            writeln!(out, "No events.")?;
            return Ok(());
        }

        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut first = true;
        for entry in entries {
            match entry {
                ScheduleEntry::Divider(divider) => {
                    write_rows(&mut out, std::mem::take(&mut rows))?;
                    if !first {
                        writeln!(out)?;
                    }
                    first = false;
                    writeln!(out, "{}", self.paint(&divider.header()?, "1"))?;
                }
                ScheduleEntry::Event(event) => {
                    rows.push(vec![
                        format_time(event, tz)?,
                        self.paint(&event.club, "33"),
                        event.name.clone(),
                        short_id(event),
                    ]);
                }
            }
        }
        write_rows(&mut out, rows)?;

        Ok(())
    }

    #[tracing::instrument(skip(self, event, now))]
    pub fn print_event_info(
        &mut self,
        event: &EventRecord,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_event_info(out, event, tz, now)
    }

    pub fn write_event_info<W: Write>(
        &self,
        mut out: W,
        event: &EventRecord,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let start = instant_to_utc(event.start)?;
        let relative = if start > now { "upcoming" } else { "past" };

        writeln!(out, "id        {}", event.id)?;
        writeln!(out, "club      {}", event.club)?;
        writeln!(out, "name      {}", event.name)?;
        writeln!(out, "type      {:?}", event.kind)?;
        writeln!(out, "day       {}", format_date(event, tz, true)?)?;
        writeln!(out, "date      {}", format_event_date(event, tz)?)?;
        writeln!(out, "time      {} ({tz}, {relative})", format_time(event, tz)?)?;
        if let Some(edited) = event.edited {
            writeln!(
                out,
                "edited    {}",
                calculate_edit_date(instant_to_utc(edited)?, now)
            )?;
        }

        if !event.description.trim().is_empty() {
            let mut rendered = String::new();
            for segment in parse_links(&event.description) {
                match segment {
                    TextSegment::Text(text) => rendered.push_str(&text),
                    TextSegment::Link(url) => rendered.push_str(&self.paint(&url, "4")),
                }
            }
            writeln!(out, "about     {rendered}")?;
        }

        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn short_id(event: &EventRecord) -> String {
    event.id.to_string().chars().take(8).collect()
}

fn write_rows<W: Write>(writer: &mut W, rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let Some(column_count) = rows.iter().map(Vec::len).max() else {
        return Ok(());
    };
    let mut widths = vec![0usize; column_count];

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "  {}{}", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::America::Chicago;

    use super::*;
    use crate::calendar::{WeekStart, build};
    use crate::datetime::parse_local_datetime;
    use crate::event::EventKind;
    use crate::schedule::bucket;

    fn render_to_string<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> anyhow::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).expect("render");
        String::from_utf8(buf).expect("utf8 output")
    }

    #[test]
    fn calendar_has_header_and_whole_weeks() {
        let reference = NaiveDate::from_ymd_opt(2024, 2, 1).expect("valid date");
        let grid = build(reference, WeekStart::Sunday);
        let marked = BTreeSet::from([NaiveDate::from_ymd_opt(2024, 2, 14).expect("valid date")]);

        let text = render_to_string(|buf| Renderer::plain().write_calendar(buf, &grid, &marked, None));
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(lines[0].trim(), "February 2024");
        assert_eq!(lines[1], " Sun Mon Tue Wed Thu Fri Sat");
        assert_eq!(lines.len(), 2 + 5);
        assert!(lines[2].starts_with(" 28  29  30  31   1 "));
        assert!(lines[4].contains(" 14*"));
    }

    #[test]
    fn schedule_groups_rows_under_headers() {
        let mut talk = EventRecord::new(
            "Chess Club".to_string(),
            "Talk".to_string(),
            parse_local_datetime("2024-01-01 10:00", Chicago).expect("start"),
        );
        talk.kind = EventKind::Event;
        talk.end = Some(parse_local_datetime("2024-01-01 14:00", Chicago).expect("end"));
        let signup = EventRecord::new(
            "Robotics".to_string(),
            "Signups open".to_string(),
            parse_local_datetime("2024-01-02 09:00", Chicago).expect("start"),
        );

        let entries = bucket(&[talk, signup], Chicago).expect("bucket");
        let text = render_to_string(|buf| Renderer::plain().write_schedule(buf, &entries, Chicago));

        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "Monday 1/1/24");
        assert!(lines[1].contains("10:00am - 2:00pm  Chess Club  Talk"));
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "Tuesday 1/2/24");
        assert!(lines[4].contains("9:00am  Robotics  Signups open"));
    }

    #[test]
    fn event_info_lists_links() {
        let mut event = EventRecord::new(
            "Robotics".to_string(),
            "Demo day".to_string(),
            parse_local_datetime("2024-02-01 18:00", Chicago).expect("start"),
        );
        event.description = "Details at https://example.org/demo.".to_string();
        let now = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid now");
        event.edited = Some((now - chrono::Duration::days(3)).timestamp_millis());

        let text =
            render_to_string(|buf| Renderer::plain().write_event_info(buf, &event, Chicago, now));

        assert!(text.contains("day       Thursday · February 1, 2024"));
        assert!(text.contains("time      6:00pm (America/Chicago, upcoming)"));
        assert!(text.contains("edited    3 days ago"));
        assert!(text.contains("about     Details at https://example.org/demo."));
    }

    #[test]
    fn month_events_list_start_times_only() {
        let mut demo = EventRecord::new(
            "Robotics".to_string(),
            "Demo".to_string(),
            parse_local_datetime("2024-02-14 18:00", Chicago).expect("start"),
        );
        demo.kind = EventKind::Event;
        demo.end = Some(parse_local_datetime("2024-02-14 20:00", Chicago).expect("end"));

        let text =
            render_to_string(|buf| Renderer::plain().write_month_events(buf, &[demo], Chicago));
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(lines[0], "");
        assert_eq!(lines[1].trim_end(), "  Feb 14  6:00pm  Robotics  Demo");
        assert!(
            render_to_string(|buf| Renderer::plain().write_month_events(buf, &[], Chicago))
                .is_empty()
        );
    }

    #[test]
    fn invalid_color_setting_is_rejected() {
        let mut cfg = Config::defaults();
        cfg.apply_overrides([("color".to_string(), "maybe".to_string())]);
        assert!(Renderer::new(&cfg).is_err());

        cfg.apply_overrides([("color".to_string(), "off".to_string())]);
        let renderer = Renderer::new(&cfg).expect("renderer");
        assert!(!renderer.color);
    }

    #[test]
    fn strip_ansi_removes_escape_codes() {
        assert_eq!(strip_ansi("\x1b[33mChess\x1b[0m"), "Chess");
    }
}
