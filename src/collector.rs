//! The collection pass: rows of the loaded page, every other page, then detail enrichment.

use chrono_tz::Tz;
use html_scraper::Html;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};
use ts_rs::TS;
use url::Url;

use crate::config::Config;
use crate::portal::{
    DetailCache, DetailEnricher, HttpTransport, LectureRecord, PageDiscovery, PageMetadata,
    PageRequest, PortalError, Transport, normalize_records, parse_rows, walk_pages,
};
use crate::utils::fmt_duration;

/// Result of one successful pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Collection {
    pub lectures: Vec<LectureRecord>,
    pub metadata: PageMetadata,
}

/// What crosses the boundary between the collector and its UI.
///
/// Serialized as either `{"lectures": [...], "metadata": {...}}` or
/// `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(untagged)]
#[ts(export)]
pub enum CollectResponse {
    Success(Collection),
    Error { error: String },
}

impl From<Result<Collection, PortalError>> for CollectResponse {
    fn from(result: Result<Collection, PortalError>) -> Self {
        match result {
            Ok(collection) => Self::Success(collection),
            Err(e) => Self::Error {
                error: e.to_string(),
            },
        }
    }
}

/// Runs collection passes against one portal.
///
/// The detail cache lives as long as the collector, so a second pass does
/// not refetch links the first one already resolved.
pub struct Collector<T> {
    transport: T,
    enricher: DetailEnricher,
    discovery: PageDiscovery,
    table_selector: String,
    timezone: Tz,
}

impl Collector<HttpTransport> {
    /// Build a collector with a real HTTP client from `config`.
    pub fn from_config(config: &Config) -> Result<Self, PortalError> {
        let transport = HttpTransport::new(&config.http_settings())?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> Collector<T> {
    pub fn new(transport: T, config: &Config) -> Self {
        Self {
            transport,
            enricher: DetailEnricher::new(config.detail_concurrency),
            discovery: PageDiscovery::with_fallback(config.page_field_fallback.clone()),
            table_selector: config.table_selector.clone(),
            timezone: config.timezone,
        }
    }

    /// Replace the page-field detection chain.
    pub fn with_discovery(mut self, discovery: PageDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cache(&self) -> &DetailCache {
        self.enricher.cache()
    }

    /// Run a pass starting from an already-loaded listing page.
    pub async fn collect(&self, body: &str, page_url: &str) -> Result<Collection, PortalError> {
        let start = Instant::now();
        let origin = Url::parse(page_url).map_err(|source| PortalError::InvalidUrl {
            url: page_url.to_string(),
            source,
        })?;

        // Html is not Send; keep it out of the awaits below.
        let (rows, metadata) = {
            let html = Html::parse_document(body);
            let rows = parse_rows(&html, Some(&origin), &self.table_selector);
            let metadata = self.discovery.discover(&html, &origin);
            (rows, metadata)
        };
        debug!(
            rows = rows.len(),
            current_page = metadata.current_page,
            total_pages = metadata.total_pages,
            page_field = metadata.form.page_field.as_str(),
            "listing page parsed"
        );

        let mut lectures =
            walk_pages(&self.transport, &metadata, rows, &self.table_selector).await?;
        normalize_records(&mut lectures, self.timezone);
        let stats = self.enricher.enrich(&self.transport, &mut lectures).await;

        info!(
            lectures = lectures.len(),
            pages = metadata.total_pages,
            details_fetched = stats.fetched,
            details_failed = stats.failed,
            duration = fmt_duration(start.elapsed()),
            "collection complete"
        );
        Ok(Collection { lectures, metadata })
    }

    /// Load the listing page at `url`, then run a pass from it.
    pub async fn collect_url(&self, url: &str) -> Result<Collection, PortalError> {
        let page = self.transport.send(PageRequest::get(url)).await?;
        if !page.is_success() {
            return Err(PortalError::ListingFetch {
                status: page.status,
            });
        }
        self.collect(&page.body, &page.url).await
    }

    /// Like [`Collector::collect_url`], folded into the boundary envelope.
    pub async fn respond(&self, url: &str) -> CollectResponse {
        self.collect_url(url).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::{CivilDateTime, FetchedPage, FormDescriptor, HttpMethod};
    use async_trait::async_trait;
    use indexmap::IndexMap;

    /// Answers every request with the same status and an empty table.
    struct StaticTransport(u16);

    #[async_trait]
    impl Transport for StaticTransport {
        async fn send(&self, request: PageRequest) -> Result<FetchedPage, PortalError> {
            Ok(FetchedPage {
                status: self.0,
                url: request.url,
                body: "<table></table>".to_string(),
            })
        }
    }

    const LISTING: &str = r#"<html><body><table>
        <tr><th>Topic</th></tr>
        <tr><td>AI</td><td>Talk</td><td>2</td><td>2024-05-01 10:00-11:00</td>
            <td>All</td><td>Dr. Li</td><td>CS</td><td></td></tr>
        </table></body></html>"#;

    #[tokio::test]
    async fn test_collect_single_page() {
        let collector = Collector::new(StaticTransport(200), &Config::default());
        let collection = collector
            .collect(LISTING, "https://gs.example.edu/list")
            .await
            .unwrap();

        assert_eq!(collection.metadata.total_pages, 1);
        assert_eq!(collection.lectures.len(), 1);
        let lecture = &collection.lectures[0];
        assert_eq!(lecture.title, "Talk");
        assert_eq!(lecture.start, CivilDateTime::new(2024, 5, 1, 10, 0));
        assert_eq!(lecture.start_timestamp, Some(1_714_528_800_000));
        assert!(collector.cache().is_empty());
    }

    #[tokio::test]
    async fn test_collect_rejects_bad_url() {
        let collector = Collector::new(StaticTransport(200), &Config::default());
        let err = collector.collect(LISTING, "not a url").await.unwrap_err();
        assert!(matches!(err, PortalError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_collect_url_listing_failure() {
        let collector = Collector::new(StaticTransport(503), &Config::default());
        let response = collector.respond("https://gs.example.edu/list").await;
        assert_eq!(
            response,
            CollectResponse::Error {
                error: "Failed to fetch listing page (HTTP 503)".to_string()
            }
        );
    }

    #[test]
    fn test_collect_response_wire_shape() {
        let error = CollectResponse::Error {
            error: "boom".to_string(),
        };
        assert_eq!(serde_json::to_string(&error).unwrap(), r#"{"error":"boom"}"#);

        let success = CollectResponse::Success(Collection {
            lectures: Vec::new(),
            metadata: PageMetadata {
                total_pages: 1,
                current_page: 1,
                total_items: None,
                origin: "https://gs.example.edu/list".to_string(),
                form: FormDescriptor {
                    action: "https://gs.example.edu/list".to_string(),
                    method: HttpMethod::Post,
                    fields: IndexMap::new(),
                    page_field: "pageNo".to_string(),
                },
            },
        });
        let json = serde_json::to_value(&success).unwrap();
        assert!(json.get("lectures").is_some());
        assert_eq!(json["metadata"]["form"]["method"], "POST");

        let parsed: CollectResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, success);
        let parsed: CollectResponse = serde_json::from_str(r#"{"error":"x"}"#).unwrap();
        assert!(matches!(parsed, CollectResponse::Error { .. }));
    }
}
