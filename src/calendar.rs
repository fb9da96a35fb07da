//! iCalendar (RFC 5545) export of lecture records.
//!
//! Times are written as floating local times (no `TZID`, no `Z`): the listing
//! prints wall-clock times and calendar clients place them in the user's zone.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::portal::LectureRecord;
use crate::utils::normalize_text;

/// Filename used when the caller does not choose one.
pub const DEFAULT_FILENAME: &str = "schedule.ics";

const PRODID: &str = "-//lectern//Lecture Schedule//EN";
const FALLBACK_TITLE: &str = "Lecture";
const DESCRIPTION_SEPARATOR: &str = " | ";
/// Maximum octets per content line before folding, excluding the CRLF.
const MAX_LINE_OCTETS: usize = 75;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Nothing selected, or no selected record could become an event.
    #[error("No lectures to export")]
    EmptyInput,
    #[error("Failed to write calendar file {}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One VEVENT, before serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub uid: String,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub description: String,
    pub location: Option<String>,
    pub url: Option<String>,
    pub categories: Vec<String>,
}

/// Replace escaped (`\n`, `\r\n`) and literal line breaks with spaces, then
/// collapse whitespace runs.
pub fn flatten_text(text: &str) -> String {
    let unescaped = text
        .replace("\\r\\n", " ")
        .replace("\\n", " ")
        .replace("\\r", " ");
    normalize_text(&unescaped)
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn build_description(record: &LectureRecord) -> String {
    let speaker = non_empty(&record.speaker).map(|s| format!("Speaker: {s}"));
    let audience = non_empty(&record.audience).map(|a| format!("Audience: {a}"));

    let parts: Vec<String> = [
        non_empty(&record.topic).map(String::from),
        non_empty(&record.department).map(String::from),
        speaker,
        audience,
        record.description.as_deref().and_then(non_empty).map(String::from),
    ]
    .into_iter()
    .flatten()
    .collect();

    flatten_text(&parts.join(DESCRIPTION_SEPARATOR))
}

fn build_location(record: &LectureRecord) -> Option<String> {
    let main = record.main_venue.as_deref().and_then(non_empty);
    let branch = record.branch_venue.as_deref().and_then(non_empty);

    let mut parts = Vec::new();
    if let Some(main) = main {
        parts.push(format!("Main venue: {main}"));
    }
    if let Some(branch) = branch {
        parts.push(format!("Branch venue: {branch}"));
    }

    if parts.is_empty() {
        non_empty(&record.department).map(String::from)
    } else {
        Some(parts.join(", "))
    }
}

/// Stable per-lecture UID so re-importing the same export updates, not duplicates.
fn event_uid(record: &LectureRecord) -> String {
    let key = format!(
        "{}\u{1f}{}\u{1f}{}\u{1f}{}",
        record.title,
        record.topic,
        record.time_text,
        record.detail_url.as_deref().unwrap_or_default()
    );
    format!("{:016x}@lectern", rapidhash::v3::rapidhash_v3(key.as_bytes()))
}

/// Convert one record. `None` when its times are unusable.
pub fn to_event(record: &LectureRecord) -> Option<CalendarEvent> {
    let start = record.start.to_naive()?;
    let end = record.end.to_naive()?;
    if end < start {
        debug!(id = record.id, time = record.time_text.as_str(), "end before start, skipping");
        return None;
    }

    let title = non_empty(&record.title)
        .or_else(|| non_empty(&record.topic))
        .unwrap_or(FALLBACK_TITLE)
        .to_string();

    Some(CalendarEvent {
        uid: event_uid(record),
        title,
        start,
        end,
        description: build_description(record),
        location: build_location(record),
        url: record.detail_url.clone(),
        categories: non_empty(&record.topic)
            .map(|t| vec![t.to_string()])
            .unwrap_or_default(),
    })
}

/// Escape a TEXT value (RFC 5545 §3.3.11).
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Fold a content line at 75 octets without splitting a UTF-8 sequence.
fn fold_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut used = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        // Continuation lines spend one octet on the leading space.
        if used + len > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            used = 1;
        }
        out.push(c);
        used += len;
    }
    out.push_str("\r\n");
    out
}

fn format_local(dt: NaiveDateTime) -> String {
    dt.format("%Y%m%dT%H%M%S").to_string()
}

/// The serialized calendar and how many events it holds.
#[derive(Debug, Clone)]
pub struct RenderedCalendar {
    pub text: String,
    pub events: usize,
}

/// Result of writing a calendar to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub events: usize,
}

/// Turns lecture records into an `.ics` document.
#[derive(Debug, Clone)]
pub struct CalendarExporter {
    stamp: DateTime<Utc>,
}

impl Default for CalendarExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl CalendarExporter {
    pub fn new() -> Self {
        Self::with_stamp(Utc::now())
    }

    /// Fix the `DTSTAMP` written on every event.
    pub fn with_stamp(stamp: DateTime<Utc>) -> Self {
        Self { stamp }
    }

    /// Convert records, dropping those that fail conversion.
    pub fn events<'a>(
        &self,
        records: impl IntoIterator<Item = &'a LectureRecord>,
    ) -> Result<Vec<CalendarEvent>, ExportError> {
        let mut seen = 0usize;
        let events: Vec<CalendarEvent> = records
            .into_iter()
            .inspect(|_| seen += 1)
            .filter_map(to_event)
            .collect();

        if events.is_empty() {
            if seen > 0 {
                warn!(records = seen, "no record could be converted to an event");
            }
            return Err(ExportError::EmptyInput);
        }
        Ok(events)
    }

    fn write_event(&self, out: &mut String, event: &CalendarEvent) {
        let stamp = self.stamp.format("%Y%m%dT%H%M%SZ");
        let mut lines = vec![
            "BEGIN:VEVENT".to_string(),
            format!("UID:{}", event.uid),
            format!("DTSTAMP:{stamp}"),
            format!("DTSTART:{}", format_local(event.start)),
            format!("DTEND:{}", format_local(event.end)),
            format!("SUMMARY:{}", escape_text(&event.title)),
        ];
        if !event.description.is_empty() {
            lines.push(format!("DESCRIPTION:{}", escape_text(&event.description)));
        }
        if let Some(location) = &event.location {
            lines.push(format!("LOCATION:{}", escape_text(location)));
        }
        if let Some(url) = &event.url {
            lines.push(format!("URL:{url}"));
        }
        if !event.categories.is_empty() {
            let categories: Vec<String> = event.categories.iter().map(|c| escape_text(c)).collect();
            lines.push(format!("CATEGORIES:{}", categories.join(",")));
        }
        lines.push("END:VEVENT".to_string());

        for line in lines {
            out.push_str(&fold_line(&line));
        }
    }

    /// Serialize records as a VCALENDAR document.
    pub fn render<'a>(
        &self,
        records: impl IntoIterator<Item = &'a LectureRecord>,
    ) -> Result<RenderedCalendar, ExportError> {
        let events = self.events(records)?;

        let mut out = String::new();
        for line in [
            "BEGIN:VCALENDAR",
            "VERSION:2.0",
            &format!("PRODID:{PRODID}"),
            "CALSCALE:GREGORIAN",
            "METHOD:PUBLISH",
        ] {
            out.push_str(&fold_line(line));
        }
        for event in &events {
            self.write_event(&mut out, event);
        }
        out.push_str("END:VCALENDAR\r\n");

        Ok(RenderedCalendar {
            text: out,
            events: events.len(),
        })
    }

    /// Render and write to `path` as UTF-8.
    pub fn export<'a>(
        &self,
        records: impl IntoIterator<Item = &'a LectureRecord>,
        path: &Path,
    ) -> Result<ExportSummary, ExportError> {
        let rendered = self.render(records)?;
        std::fs::write(path, rendered.text.as_bytes()).map_err(|source| {
            ExportError::Serialization {
                path: path.to_path_buf(),
                source,
            }
        })?;

        info!(
            path = %path.display(),
            events = rendered.events,
            "calendar exported"
        );
        Ok(ExportSummary {
            path: path.to_path_buf(),
            events: rendered.events,
        })
    }
}
