//! Data types shared by the row parser, pagination walker and detail enricher.

use chrono::{NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Local wall-clock time as printed on the listing page, without a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CivilDateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl CivilDateTime {
    pub fn new(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
        }
    }

    /// Returns `None` when the tuple is not a real date/time (e.g. `2024-02-30`).
    pub fn to_naive(self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?.and_hms_opt(
            self.hour,
            self.minute,
            0,
        )
    }

    pub fn date(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    /// Minutes since midnight, for date-independent time-of-day comparisons.
    pub fn minute_of_day(self) -> u32 {
        self.hour * 60 + self.minute
    }

    /// Epoch milliseconds of this wall-clock time in `tz`.
    ///
    /// Ambiguous local times (DST fold) resolve to the earlier instant; local
    /// times inside a DST gap have no instant and return `None`.
    pub fn timestamp_millis(self, tz: Tz) -> Option<i64> {
        let naive = self.to_naive()?;
        tz.from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.timestamp_millis())
    }
}

/// One lecture row of the listing table, plus detail-page enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LectureRecord {
    /// Position in the merged set. Reassigned by [`normalize_records`].
    pub id: u32,
    pub topic: String,
    pub title: String,
    pub credits: i32,
    /// The normalized time cell, e.g. `2024-05-01 10:00-11:30`.
    pub time_text: String,
    pub start: CivilDateTime,
    pub end: CivilDateTime,
    pub start_timestamp: Option<i64>,
    pub end_timestamp: Option<i64>,
    pub audience: String,
    pub speaker: String,
    pub department: String,
    pub detail_url: Option<String>,
    pub description: Option<String>,
    pub main_venue: Option<String>,
    pub branch_venue: Option<String>,
}

impl LectureRecord {
    /// Fill enrichment fields that are still unset from a detail payload.
    pub fn apply_detail(&mut self, info: &DetailInfo) {
        if self.description.is_none() {
            self.description = info.description.clone();
        }
        if self.main_venue.is_none() {
            self.main_venue = info.main_venue.clone();
        }
        if self.branch_venue.is_none() {
            self.branch_venue = info.branch_venue.clone();
        }
        if self.description.is_none() {
            self.description = Some(String::new());
        }
    }

    /// Whether either venue field carries any text.
    pub fn has_venue(&self) -> bool {
        [&self.main_venue, &self.branch_venue]
            .into_iter()
            .flatten()
            .any(|v| !v.trim().is_empty())
    }
}

/// Reassign positional ids and backfill epoch timestamps after pages are merged.
pub fn normalize_records(records: &mut [LectureRecord], tz: Tz) {
    for (index, record) in records.iter_mut().enumerate() {
        record.id = index as u32;
        if record.start_timestamp.is_none() {
            record.start_timestamp = record.start.timestamp_millis(tz);
        }
        if record.end_timestamp.is_none() {
            record.end_timestamp = record.end.timestamp_millis(tz);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum HttpMethod {
    Get,
    Post,
}

/// The search/pagination form captured from the loaded page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FormDescriptor {
    /// Absolute submit URL.
    pub action: String,
    pub method: HttpMethod,
    /// Field name → value, in document order.
    pub fields: IndexMap<String, String>,
    /// The field whose value selects the page to render.
    pub page_field: String,
}

impl FormDescriptor {
    /// Clone the field map with the page field pointing at `page`.
    pub fn fields_for_page(&self, page: u32) -> IndexMap<String, String> {
        let mut fields = self.fields.clone();
        fields.insert(self.page_field.clone(), page.to_string());
        fields
    }
}

/// Pagination state of the listing, captured once per collection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PageMetadata {
    pub total_pages: u32,
    pub current_page: u32,
    pub total_items: Option<u32>,
    /// URL of the page the collection started from.
    pub origin: String,
    pub form: FormDescriptor,
}

/// Enrichment scraped from one detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DetailInfo {
    pub description: Option<String>,
    pub main_venue: Option<String>,
    pub branch_venue: Option<String>,
}
