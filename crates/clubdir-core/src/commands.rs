use std::collections::BTreeSet;
use std::io::{self, Read};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};

use crate::calendar;
use crate::cli::Invocation;
use crate::config::Config;
use crate::datetime::{
    CivilZone, Instant, default_edit_date, default_edit_time, guess_date_input, local_date,
    millis_to_date_and_time, parse_local_datetime,
};
use crate::event::{EventKind, EventRecord};
use crate::format::{format_date, format_time};
use crate::links::links;
use crate::listing::EventListing;
use crate::render::Renderer;
use crate::schedule::{bucket, divider_count};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "calendar", "schedule", "add", "info", "export", "import", "zone", "commands", "show",
        "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(listing, cfg, renderer, zone, inv))]
pub fn dispatch(
    listing: &EventListing,
    cfg: &Config,
    renderer: &mut Renderer,
    zone: CivilZone,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let command = inv.command.as_str();

    debug!(
        command,
        args = ?inv.command_args,
        zone = %zone.tz,
        "dispatching command"
    );

    match command {
        "calendar" => cmd_calendar(listing, cfg, renderer, zone.tz, &inv.command_args, now),
        "schedule" => cmd_schedule(listing, renderer, zone.tz, &inv.command_args),
        "add" => cmd_add(listing, zone.tz, &inv.command_args, now),
        "info" => cmd_info(listing, renderer, zone.tz, &inv.command_args, now),
        "export" => cmd_export(listing),
        "import" => cmd_import(listing, now),
        "zone" => cmd_zone(zone),
        "commands" => cmd_commands(),
        "show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(listing, cfg, renderer, args, now))]
fn cmd_calendar(
    listing: &EventListing,
    cfg: &Config,
    renderer: &mut Renderer,
    tz: Tz,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command calendar");

    let today = now.with_timezone(&tz).date_naive();
    let (offset, date_input) = parse_calendar_args(args)?;
    let date_input = if date_input.is_empty() {
        date_input
    } else {
        guess_date_input(&date_input, today)?
    };

    let grid = calendar::generate(today, offset, &date_input, cfg.week_start()?)?;

    let mut marked = BTreeSet::new();
    let mut in_month = Vec::new();
    for event in listing.load_sorted()? {
        let day = local_date(event.start, tz)?;
        marked.insert(day);
        if calendar::first_day_of_month(day) == grid.reference {
            in_month.push(event);
        }
    }

    debug!(
        reference = %grid.reference,
        cells = grid.len(),
        marked = marked.len(),
        "rendering calendar"
    );
    renderer.print_calendar(&grid, &marked, Some(today))?;
    renderer.print_month_events(&in_month, tz)
}

/// Splits `calendar` arguments into a month offset (`+N`/`-N`) and date text.
fn parse_calendar_args(args: &[String]) -> anyhow::Result<(i32, String)> {
    let mut offset = 0_i32;
    let mut date_parts = Vec::new();

    for arg in args {
        let is_offset = arg.len() > 1
            && (arg.starts_with('+') || arg.starts_with('-'))
            && arg[1..].chars().all(|c| c.is_ascii_digit());
        if is_offset {
            let value: i32 = arg
                .parse()
                .with_context(|| format!("invalid month offset: {arg}"))?;
            offset = offset
                .checked_add(value)
                .ok_or_else(|| anyhow!("month offset out of range"))?;
        } else {
            date_parts.push(arg.as_str());
        }
    }

    Ok((offset, date_parts.join(" ")))
}

#[instrument(skip(listing, renderer, args))]
fn cmd_schedule(
    listing: &EventListing,
    renderer: &mut Renderer,
    tz: Tz,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command schedule");

    let mut events = listing.load_sorted()?;
    let club = args.join(" ").trim().to_lowercase();
    if !club.is_empty() {
        events.retain(|event| event.club.to_lowercase().contains(&club));
        debug!(club = %club, kept = events.len(), "filtered events by club");
    }

    let entries = bucket(&events, tz)?;
    debug!(
        events = events.len(),
        days = divider_count(&entries),
        "schedule bucketed"
    );
    renderer.print_schedule(&entries, tz)
}

#[derive(Debug, Clone)]
enum Mod {
    Club(String),
    Start(Instant),
    End(Instant),
    Kind(EventKind),
    Description(String),
}

#[instrument(skip(args, now))]
fn parse_event_args(args: &[String], tz: Tz, now: DateTime<Utc>) -> anyhow::Result<EventRecord> {
    let mut name_parts = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg, tz)? {
            mods.push(one_mod);
            continue;
        }

        name_parts.push(arg.clone());
    }

    if name_parts.is_empty() {
        return Err(anyhow!("add: event name is required"));
    }

    let mut club = None;
    let mut start = None;
    let mut end = None;
    let mut kind = None;
    let mut description = String::new();
    for one_mod in mods {
        match one_mod {
            Mod::Club(value) => club = Some(value),
            Mod::Start(value) => start = Some(value),
            Mod::End(value) => end = Some(value),
            Mod::Kind(value) => kind = Some(value),
            Mod::Description(value) => description = value,
        }
    }

    let club = club.ok_or_else(|| anyhow!("add: club:<name> is required"))?;
    let (start, end) = match start {
        Some(start) => (start, end.unwrap_or(start)),
        None => {
            let start = default_edit_instant(now, tz, false)?;
            let end = match end {
                Some(end) => end,
                None => default_edit_instant(now, tz, true)?,
            };
            debug!(start, end, "add: defaulted start to the next whole hour");
            (start, end)
        }
    };
    if end < start {
        return Err(anyhow!("add: end must not be before start"));
    }

    let mut event = EventRecord::new(club, name_parts.join(" "), start);
    event.end = Some(end);
    event.kind = kind.unwrap_or(if end != start {
        EventKind::Event
    } else {
        EventKind::Point
    });
    event.description = description;
    Ok(event)
}

fn default_edit_instant(now: DateTime<Utc>, tz: Tz, end: bool) -> anyhow::Result<Instant> {
    let date = default_edit_date(now, tz, end)?;
    let time = default_edit_time(now, tz, end)?;
    parse_local_datetime(&format!("{date} {time}"), tz)
}

fn parse_one_mod(tok: &str, tz: Tz) -> anyhow::Result<Option<Mod>> {
    let Some((key, value)) = tok.split_once(':') else {
        return Ok(None);
    };

    match key.to_ascii_lowercase().as_str() {
        "club" => Ok(Some(Mod::Club(value.trim().to_string()))),
        "start" => Ok(Some(Mod::Start(parse_local_datetime(value, tz)?))),
        "end" => Ok(Some(Mod::End(parse_local_datetime(value, tz)?))),
        "type" => Ok(Some(Mod::Kind(value.parse()?))),
        "desc" | "description" => Ok(Some(Mod::Description(value.trim().to_string()))),
        _ => Ok(None),
    }
}

#[instrument(skip(listing, args, now))]
fn cmd_add(
    listing: &EventListing,
    tz: Tz,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    let mut event = parse_event_args(args, tz, now)?;
    event.edited = Some(now.timestamp_millis());
    let events = listing.add(event.clone())?;
    debug!(total = events.len(), "event added");

    let fields = millis_to_date_and_time(event.start, tz)?;
    println!(
        "Created event {} on {} at {} ({}).",
        &event.id.to_string()[..8],
        fields.date,
        fields.time,
        format_time(&event, tz)?
    );
    Ok(())
}

#[instrument(skip(listing, renderer, args, now))]
fn cmd_info(
    listing: &EventListing,
    renderer: &mut Renderer,
    tz: Tz,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command info");

    let prefix = args
        .first()
        .ok_or_else(|| anyhow!("info requires an event id or id prefix"))?;
    let event = listing.find_by_prefix(prefix)?;
    debug!(
        id = %event.id,
        date = %format_date(&event, tz, false)?,
        links = links(&event.description).len(),
        "found event"
    );
    renderer.print_event_info(&event, tz, now)
}

fn cmd_export(listing: &EventListing) -> anyhow::Result<()> {
    info!("command export");

    let events = listing.load_sorted()?;
    let out = serde_json::to_string(&events)?;
    println!("{out}");
    Ok(())
}

fn cmd_import(listing: &EventListing, now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command import");

    let mut stdin = String::new();
    io::stdin()
        .read_to_string(&mut stdin)
        .context("failed reading stdin")?;

    let trimmed = stdin.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("import: empty input"));
    }

    let mut imported = parse_import_items(trimmed)?;
    for event in &mut imported {
        event.edited.get_or_insert(now.timestamp_millis());
    }
    let (added, updated) = listing.upsert(imported)?;
    println!("Imported {added} new and {updated} updated event(s).");
    Ok(())
}

/// Accepts a JSON array or JSON lines.
fn parse_import_items(trimmed: &str) -> anyhow::Result<Vec<EventRecord>> {
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("import: invalid JSON array");
    }

    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line.trim())
                .with_context(|| format!("import: invalid JSON on line {}", idx + 1))
        })
        .collect()
}

fn cmd_zone(zone: CivilZone) -> anyhow::Result<()> {
    if zone.source == crate::datetime::ZoneSource::Default {
        warn!("civil zone fell back to the deployment default");
    }
    println!("{} ({})", zone.tz, zone.source.as_str());
    Ok(())
}

fn cmd_commands() -> anyhow::Result<()> {
    for command in known_command_names() {
        println!("{command}");
    }
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    for path in &cfg.loaded_files {
        println!("# loaded {}", path.display());
    }
    for (k, v) in cfg.iter() {
        println!("{k}={v}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Commands: calendar [DATE] [+N|-N], schedule [CLUB], \
         add NAME club:CLUB [start:DATETIME] [end:DATETIME] [type:event|point] [desc:TEXT], \
         info ID, export, import, zone, commands, show, version"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono_tz::America::Chicago;

    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    fn now() -> DateTime<Utc> {
        chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 1, 1, 16, 20, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("sc", &known), Some("schedule"));
        assert_eq!(expand_command_abbrev("cal", &known), Some("calendar"));
        assert_eq!(expand_command_abbrev("c", &known), None);
        assert_eq!(expand_command_abbrev("Chess", &known), None);
    }

    #[test]
    fn calendar_args_split_offset_and_date() {
        let (offset, date) =
            parse_calendar_args(&strings(&["Feb", "1,", "2024", "+2", "-1"])).expect("parse");
        assert_eq!(offset, 1);
        assert_eq!(date, "Feb 1, 2024");

        let (offset, date) = parse_calendar_args(&[]).expect("parse");
        assert_eq!(offset, 0);
        assert!(date.is_empty());
    }

    #[test]
    fn add_args_build_ranged_event() {
        let event = parse_event_args(
            &strings(&[
                "Open",
                "Play",
                "club:Chess Club",
                "start:2024-01-01 10:00",
                "end:2024-01-01T14:00",
                "desc:Bring boards",
            ]),
            Chicago,
            now(),
        )
        .expect("parse");

        assert_eq!(event.name, "Open Play");
        assert_eq!(event.club, "Chess Club");
        assert_eq!(event.kind, EventKind::Event);
        assert_eq!(event.description, "Bring boards");
        assert_eq!(format_time(&event, Chicago).expect("format"), "10:00am - 2:00pm");
    }

    #[test]
    fn add_without_end_is_point() {
        let event = parse_event_args(
            &strings(&["Signups", "club:Robotics", "start:2024-01-02T09:00"]),
            Chicago,
            now(),
        )
        .expect("parse");
        assert_eq!(event.kind, EventKind::Point);
        assert_eq!(event.end, Some(event.start));
    }

    #[test]
    fn add_rejects_missing_fields_and_reversed_range() {
        let no_name = strings(&["club:Robotics", "start:2024-01-02T09:00"]);
        assert!(parse_event_args(&no_name, Chicago, now()).is_err());
        let no_club = strings(&["Demo", "start:2024-01-02T09:00"]);
        assert!(parse_event_args(&no_club, Chicago, now()).is_err());
        assert!(
            parse_event_args(
                &strings(&[
                    "Demo",
                    "club:Robotics",
                    "start:2024-01-02T09:00",
                    "end:2024-01-02T08:00"
                ]),
                Chicago,
                now()
            )
            .is_err()
        );
    }

    #[test]
    fn add_without_start_uses_next_whole_hour() {
        let event = parse_event_args(&strings(&["Meetup", "club:Robotics"]), Chicago, now())
            .expect("parse");

        let fields = millis_to_date_and_time(event.start, Chicago).expect("fields");
        assert_eq!(fields.date, "2024-01-01");
        assert_eq!(fields.time, "11:00");
        assert_eq!(event.kind, EventKind::Event);
        assert_eq!(format_time(&event, Chicago).expect("format"), "11:00am - 12:00pm");
    }

    #[test]
    fn literal_marker_keeps_colons_in_name() {
        let event = parse_event_args(
            &strings(&["club:Film", "start:2024-01-02T19:00", "--", "Movie:", "club:night"]),
            Chicago,
            now(),
        )
        .expect("parse");
        assert_eq!(event.name, "Movie: club:night");
        assert_eq!(event.club, "Film");
    }

    #[test]
    fn import_accepts_array_and_lines() {
        let array = r#"[{"start":0,"club":"A","name":"x"},{"start":1,"club":"B","name":"y"}]"#;
        assert_eq!(parse_import_items(array).expect("array").len(), 2);

        let lines = "{\"start\":0,\"club\":\"A\",\"name\":\"x\"}\n\n{\"start\":1,\"club\":\"B\",\"name\":\"y\"}";
        assert_eq!(parse_import_items(lines).expect("lines").len(), 2);

        assert!(parse_import_items("{not json}").is_err());
    }
}
