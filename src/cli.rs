use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, ValueEnum};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::calendar::DEFAULT_FILENAME;
use crate::config::DEFAULT_CONFIG_FILE;
use crate::filter::FilterState;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_SHORT"), ")");

/// Collect every lecture from a listing page and export the matching ones as iCalendar.
///
/// Repeating a filter flag accepts any of the given values.
#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
pub struct Args {
    /// Listing page to start from
    pub url: String,

    /// Where to write the calendar
    #[arg(short, long, default_value = DEFAULT_FILENAME)]
    pub output: PathBuf,

    /// Print the collector response as JSON instead of exporting
    #[arg(long)]
    pub json: bool,

    /// Detail pages fetched at once (overrides the config file)
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[arg(long)]
    pub topic: Vec<String>,
    #[arg(long)]
    pub title: Vec<String>,
    #[arg(long)]
    pub speaker: Vec<String>,
    #[arg(long)]
    pub department: Vec<String>,
    #[arg(long)]
    pub audience: Vec<String>,
    #[arg(long)]
    pub credits: Vec<i32>,
    /// Campus name matched inside either venue
    #[arg(long)]
    pub campus: Vec<String>,

    /// Earliest lecture date, inclusive
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub from: Option<NaiveDate>,
    /// Latest lecture date, inclusive
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub to: Option<NaiveDate>,
    /// Earliest start time of day, inclusive
    #[arg(long, value_name = "HH:MM", value_parser = parse_time_of_day)]
    pub after: Option<NaiveTime>,
    /// Latest start time of day, inclusive
    #[arg(long, value_name = "HH:MM", value_parser = parse_time_of_day)]
    pub before: Option<NaiveTime>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = TracingFormat::Pretty)]
    pub tracing: TracingFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Colored single-line output for terminals
    Pretty,
    /// One JSON object per line
    Json,
}

fn parse_time_of_day(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|e| format!("expected HH:MM: {e}"))
}

fn to_set<T: Ord + Clone>(values: &[T]) -> BTreeSet<T> {
    values.iter().cloned().collect()
}

impl Args {
    /// The filter described by the command-line flags.
    pub fn filter(&self) -> FilterState {
        FilterState {
            topic: to_set(&self.topic),
            title: to_set(&self.title),
            speaker: to_set(&self.speaker),
            department: to_set(&self.department),
            audience: to_set(&self.audience),
            credits: to_set(&self.credits),
            campus: to_set(&self.campus),
            date_from: self.from,
            date_to: self.to,
            time_from: self.after,
            time_to: self.before,
        }
    }
}
