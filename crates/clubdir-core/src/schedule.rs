use anyhow::Context;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datetime::local_date;
use crate::event::EventRecord;

/// Marks the start of a new local day in a schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateDivider {
    /// `YYYY-MM-DD`
    pub day: String,
}

impl DateDivider {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            day: date.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn date(&self) -> anyhow::Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.day, "%Y-%m-%d")
            .with_context(|| format!("invalid divider day: {}", self.day))
    }

    /// Section label, e.g. `Thursday 2/1/24`.
    pub fn header(&self) -> anyhow::Result<String> {
        Ok(self.date()?.format("%A %-m/%-d/%y").to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "entry", rename_all = "lowercase")]
pub enum ScheduleEntry {
    Divider(DateDivider),
    Event(EventRecord),
}

/// Interleaves `events` with a divider before the first event of each local day.
///
/// `events` must already be sorted by start. Unsorted input is not detected and
/// only produces extra dividers. The input slice is left untouched.
pub fn bucket(events: &[EventRecord], tz: Tz) -> anyhow::Result<Vec<ScheduleEntry>> {
    let mut out = Vec::with_capacity(events.len() * 2);
    let mut last_seen: Option<NaiveDate> = None;

    for event in events {
        let day = local_date(event.start, tz)
            .with_context(|| format!("event {} has an invalid start", event.id))?;

        if last_seen != Some(day) {
            last_seen = Some(day);
            out.push(ScheduleEntry::Divider(DateDivider::new(day)));
        }
        out.push(ScheduleEntry::Event(event.clone()));
    }

    debug!(
        events = events.len(),
        dividers = out.len() - events.len(),
        zone = %tz,
        "bucketed schedule"
    );
    Ok(out)
}

pub fn events_only(entries: &[ScheduleEntry]) -> Vec<EventRecord> {
    entries
        .iter()
        .filter_map(|entry| match entry {
            ScheduleEntry::Event(event) => Some(event.clone()),
            ScheduleEntry::Divider(_) => None,
        })
        .collect()
}

pub fn divider_count(entries: &[ScheduleEntry]) -> usize {
    entries
        .iter()
        .filter(|entry| matches!(entry, ScheduleEntry::Divider(_)))
        .count()
}
