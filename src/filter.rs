//! Client-side narrowing of a collected record set.

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use ts_rs::TS;
use unicode_normalization::UnicodeNormalization;

use crate::portal::LectureRecord;

/// Accepted values per field plus optional date/time bounds.
///
/// An empty set accepts every value. Bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct FilterState {
    pub topic: BTreeSet<String>,
    pub title: BTreeSet<String>,
    pub speaker: BTreeSet<String>,
    pub department: BTreeSet<String>,
    pub audience: BTreeSet<String>,
    pub credits: BTreeSet<i32>,
    /// Campus names, matched as substrings of either venue.
    pub campus: BTreeSet<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub time_from: Option<NaiveTime>,
    pub time_to: Option<NaiveTime>,
}

fn accepts<T: Ord>(set: &BTreeSet<T>, value: &T) -> bool {
    set.is_empty() || set.contains(value)
}

fn fold(text: &str) -> String {
    text.nfkc().collect()
}

impl FilterState {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, record: &LectureRecord) -> bool {
        accepts(&self.topic, &record.topic)
            && accepts(&self.title, &record.title)
            && accepts(&self.speaker, &record.speaker)
            && accepts(&self.department, &record.department)
            && accepts(&self.audience, &record.audience)
            && accepts(&self.credits, &record.credits)
            && self.matches_dates(record)
            && self.matches_times(record)
            && self.matches_campus(record)
    }

    pub fn apply<'a>(&self, records: &'a [LectureRecord]) -> Vec<&'a LectureRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }

    fn matches_dates(&self, record: &LectureRecord) -> bool {
        if self.date_from.is_none() && self.date_to.is_none() {
            return true;
        }
        let Some(day) = record.start.date() else {
            return false;
        };
        self.date_from.is_none_or(|from| day >= from) && self.date_to.is_none_or(|to| day <= to)
    }

    fn matches_times(&self, record: &LectureRecord) -> bool {
        let minute = record.start.minute_of_day();
        let of = |t: NaiveTime| t.hour() * 60 + t.minute();
        self.time_from.is_none_or(|from| minute >= of(from))
            && self.time_to.is_none_or(|to| minute <= of(to))
    }

    fn matches_campus(&self, record: &LectureRecord) -> bool {
        if self.campus.is_empty() {
            return true;
        }
        if !record.has_venue() {
            return false;
        }
        let venues: Vec<String> = [&record.main_venue, &record.branch_venue]
            .into_iter()
            .flatten()
            .map(|v| fold(v))
            .collect();
        self.campus.iter().map(|c| fold(c)).any(|campus| {
            !campus.is_empty() && venues.iter().any(|venue| venue.contains(&campus))
        })
    }
}

/// Distinct values present in a record set, for building pickers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FilterOptions {
    pub topic: BTreeSet<String>,
    pub title: BTreeSet<String>,
    pub speaker: BTreeSet<String>,
    pub department: BTreeSet<String>,
    pub audience: BTreeSet<String>,
    pub credits: BTreeSet<i32>,
    pub earliest: Option<NaiveDate>,
    pub latest: Option<NaiveDate>,
}

impl FilterOptions {
    pub fn from_records(records: &[LectureRecord]) -> Self {
        let mut options = Self::default();
        for record in records {
            for (set, value) in [
                (&mut options.topic, &record.topic),
                (&mut options.title, &record.title),
                (&mut options.speaker, &record.speaker),
                (&mut options.department, &record.department),
                (&mut options.audience, &record.audience),
            ] {
                if !value.is_empty() {
                    set.insert(value.clone());
                }
            }
            options.credits.insert(record.credits);

            if let Some(day) = record.start.date() {
                options.earliest = Some(options.earliest.map_or(day, |d| d.min(day)));
                options.latest = Some(options.latest.map_or(day, |d| d.max(day)));
            }
        }
        options
    }
}
