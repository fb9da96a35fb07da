//! Client for the university lecture portal: table rows, pagination replay
//! and detail-page enrichment.

pub mod detail;
pub mod errors;
pub mod models;
pub mod pagination;
pub mod rows;
pub mod transport;

pub use detail::{DetailCache, DetailEnricher, EnrichStats, parse_detail};
pub use errors::PortalError;
pub use models::{
    CivilDateTime, DetailInfo, FormDescriptor, HttpMethod, LectureRecord, PageMetadata,
    normalize_records,
};
pub use pagination::{
    NameHeuristic, PageDiscovery, PageFieldContext, PageFieldStrategy, ScriptReference,
    walk_pages,
};
pub use rows::parse_rows;
pub use transport::{FetchedPage, HttpSettings, HttpTransport, PageRequest, Transport};
