//! Collect a university lecture listing across all of its pages, enrich each
//! lecture from its detail page, narrow the set with filters and export the
//! selection as an iCalendar file.

pub mod app;
pub mod calendar;
pub mod cli;
pub mod collector;
pub mod config;
pub mod filter;
pub mod logging;
pub mod popup;
pub mod portal;
pub mod utils;

pub use calendar::{CalendarExporter, ExportError};
pub use collector::{CollectResponse, Collection, Collector};
pub use filter::FilterState;
pub use popup::{PopupError, PopupState, SelectionMode};
pub use portal::{LectureRecord, PageMetadata, PortalError};
