use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::event::EventRecord;

/// JSON-lines file of club events, one `EventRecord` per line.
#[derive(Debug)]
pub struct EventListing {
    pub data_dir: PathBuf,
    pub events_path: PathBuf,
}

impl EventListing {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let events_path = data_dir.join("events.data");
        if !events_path.exists() {
            fs::write(&events_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            events = %events_path.display(),
            "opened event listing"
        );

        Ok(Self {
            data_dir,
            events_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> anyhow::Result<Vec<EventRecord>> {
        load_jsonl(&self.events_path).context("failed to load events.data")
    }

    /// All events ordered by start, ties broken by end.
    #[tracing::instrument(skip(self))]
    pub fn load_sorted(&self) -> anyhow::Result<Vec<EventRecord>> {
        let mut events = self.load()?;
        events.sort_by_key(|event| (event.start, event.end_or_start()));
        Ok(events)
    }

    #[tracing::instrument(skip(self, events))]
    pub fn save(&self, events: &[EventRecord]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.events_path, events).context("failed to save events.data")
    }

    #[tracing::instrument(skip(self, event), fields(id = %event.id, club = %event.club))]
    pub fn add(&self, event: EventRecord) -> anyhow::Result<Vec<EventRecord>> {
        let mut events = self.load()?;
        if events.iter().any(|existing| existing.id == event.id) {
            return Err(anyhow!("event already exists: {}", event.id));
        }
        events.push(event);
        events.sort_by_key(|event| (event.start, event.end_or_start()));
        self.save(&events)?;
        Ok(events)
    }

    /// Inserts or replaces each event by id. Returns `(added, updated)`.
    #[tracing::instrument(skip(self, incoming))]
    pub fn upsert(&self, incoming: Vec<EventRecord>) -> anyhow::Result<(usize, usize)> {
        let mut events = self.load()?;
        let mut added = 0;
        let mut updated = 0;

        for event in incoming {
            if let Some(existing) = events.iter_mut().find(|existing| existing.id == event.id) {
                *existing = event;
                updated += 1;
            } else {
                events.push(event);
                added += 1;
            }
        }

        if added + updated > 0 {
            events.sort_by_key(|event| (event.start, event.end_or_start()));
            self.save(&events)?;
        }
        debug!(added, updated, total = events.len(), "upserted events");
        Ok((added, updated))
    }

    /// Finds the single event whose id starts with `prefix`.
    pub fn find_by_prefix(&self, prefix: &str) -> anyhow::Result<EventRecord> {
        let prefix = prefix.trim().to_ascii_lowercase();
        if prefix.is_empty() {
            return Err(anyhow!("event id prefix cannot be empty"));
        }
        if let Ok(uuid) = Uuid::parse_str(&prefix) {
            return self
                .load()?
                .into_iter()
                .find(|event| event.id == uuid)
                .ok_or_else(|| anyhow!("event not found: {uuid}"));
        }

        let mut matches = self
            .load()?
            .into_iter()
            .filter(|event| event.id.to_string().starts_with(&prefix));
        let first = matches
            .next()
            .ok_or_else(|| anyhow!("no event id starts with {prefix}"))?;
        if matches.next().is_some() {
            return Err(anyhow!("event id prefix {prefix} is ambiguous"));
        }
        Ok(first)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<EventRecord>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let event: EventRecord = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(event);
    }

    debug!(count = out.len(), "loaded events from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, events))]
fn save_jsonl_atomic(path: &Path, events: &[EventRecord]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = events.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for event in events {
        let serialized = serde_json::to_string(event)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
