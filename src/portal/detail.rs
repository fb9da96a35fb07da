//! Detail page enrichment.
//!
//! Each lecture row links to a detail page carrying the long-form
//! introduction and the venues. The page is a loose key/value table: the
//! introduction sits in the row after a "讲座介绍" heading row, venues appear
//! either as `主会场地点：X 分会场地点：Y` in one row or as label/value cells.

use dashmap::DashMap;
use futures::future::join_all;
use html_scraper::{ElementRef, Html, Selector};
use indexmap::IndexSet;
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::portal::errors::PortalError;
use crate::portal::models::{DetailInfo, LectureRecord};
use crate::portal::transport::{PageRequest, Transport};
use crate::utils::{compact_text, fmt_duration, normalize_text};

/// Default number of detail pages fetched at once.
pub const DEFAULT_DETAIL_CONCURRENCY: usize = 5;

/// Heading row that precedes the lecture introduction.
const INTRO_MARKER: &str = "讲座介绍";

static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());

static COMBINED_VENUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"主会场(?:地点)?\s*[:：]\s*(.*?)\s*分会场(?:地点)?\s*[:：]\s*(.*)").unwrap()
});
static MAIN_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^主会场(?:地点)?\s*(?:[:：]\s*(.*?))?\s*(?:分会场.*)?$").unwrap());
static BRANCH_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^分会场(?:地点)?\s*(?:[:：]\s*(.*))?$").unwrap());

/// Set `slot` unless it already holds a value. Blank values never count.
fn assign_once(slot: &mut Option<String>, value: &str) {
    let value = value.trim();
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value.to_string());
    }
}

fn row_cells(row: ElementRef<'_>) -> Vec<String> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "td" | "th"))
        .map(|cell| normalize_text(&cell.text().collect::<String>()))
        .collect()
}

/// Scan label cells of one row, consuming the value cell after a bare label.
fn scan_venue_cells(cells: &[String], info: &mut DetailInfo) {
    let mut i = 0;
    while i < cells.len() {
        let text = &cells[i];
        let (slot, caps) = if let Some(caps) = MAIN_LABEL_RE.captures(text) {
            (&mut info.main_venue, caps)
        } else if let Some(caps) = BRANCH_LABEL_RE.captures(text) {
            (&mut info.branch_venue, caps)
        } else {
            i += 1;
            continue;
        };

        match caps.get(1).map(|m| m.as_str().trim()).filter(|v| !v.is_empty()) {
            Some(inline) => assign_once(slot, inline),
            None => {
                if let Some(next) = cells.get(i + 1) {
                    assign_once(slot, next);
                    i += 1;
                }
            }
        }
        i += 1;
    }
}

/// Extract description and venues from a detail page.
///
/// Rows are read top to bottom and the first value found for each field
/// wins; later rows never override it.
pub fn parse_detail(html: &Html) -> DetailInfo {
    let mut info = DetailInfo::default();
    let mut description_next = false;

    for row in html.select(&ROW_SEL) {
        let cells = row_cells(row);
        let row_text = if cells.is_empty() {
            normalize_text(&row.text().collect::<String>())
        } else {
            normalize_text(&cells.join(" "))
        };

        if description_next {
            assign_once(&mut info.description, &row_text);
            description_next = false;
        }
        if compact_text(&row_text).contains(INTRO_MARKER) {
            description_next = true;
        }

        // Both venues in one cell; never match across cells.
        let segments = if cells.is_empty() {
            std::slice::from_ref(&row_text)
        } else {
            cells.as_slice()
        };
        for segment in segments {
            if let Some(caps) = COMBINED_VENUE_RE.captures(segment) {
                assign_once(&mut info.main_venue, &caps[1]);
                assign_once(&mut info.branch_venue, &caps[2]);
            }
        }
        scan_venue_cells(&cells, &mut info);
    }

    info
}

/// Detail results keyed by link, shared by all workers of a pass.
///
/// Cloning is cheap and clones share entries, so a [`crate::Collector`] keeps
/// one for its lifetime and repeated passes skip links already seen.
#[derive(Debug, Clone, Default)]
pub struct DetailCache {
    inner: Arc<DashMap<String, DetailInfo>>,
}

impl DetailCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, link: &str) -> Option<DetailInfo> {
        self.inner.get(link).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, link: &str) -> bool {
        self.inner.contains_key(link)
    }

    pub fn insert(&self, link: String, info: DetailInfo) {
        self.inner.insert(link, info);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Counters for one enrichment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichStats {
    /// Distinct links requested during this pass.
    pub fetched: usize,
    /// Of those, how many failed and were cached empty.
    pub failed: usize,
    /// Distinct links answered from the cache without a request.
    pub reused: usize,
}

/// Back-fills description and venues from detail pages, a bounded number at a time.
pub struct DetailEnricher {
    concurrency: usize,
    cache: DetailCache,
}

impl Default for DetailEnricher {
    fn default() -> Self {
        Self::new(DEFAULT_DETAIL_CONCURRENCY)
    }
}

impl DetailEnricher {
    /// `concurrency` is clamped to at least 1.
    pub fn new(concurrency: usize) -> Self {
        Self::with_cache(concurrency, DetailCache::new())
    }

    pub fn with_cache(concurrency: usize, cache: DetailCache) -> Self {
        Self {
            concurrency: concurrency.max(1),
            cache,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn cache(&self) -> &DetailCache {
        &self.cache
    }

    async fn fetch_detail<T: Transport + ?Sized>(
        transport: &T,
        link: &str,
    ) -> Result<DetailInfo, PortalError> {
        let fetched = transport.send(PageRequest::get(link)).await?;
        if !fetched.is_success() {
            return Err(PortalError::DetailFetch {
                status: fetched.status,
            });
        }
        Ok(parse_detail(&Html::parse_document(&fetched.body)))
    }

    /// Enrich `records` in place.
    ///
    /// Every distinct link not already cached is fetched exactly once, by a
    /// pool of `min(concurrency, pending links)` workers drawing from a shared
    /// cursor. Failures are logged and cached as empty so the link is not
    /// retried. Returns once every dispatched fetch has finished.
    pub async fn enrich<T: Transport + ?Sized>(
        &self,
        transport: &T,
        records: &mut [LectureRecord],
    ) -> EnrichStats {
        let start = Instant::now();

        let links: IndexSet<&str> = records
            .iter()
            .filter_map(|r| r.detail_url.as_deref())
            .collect();
        let pending: Vec<String> = links
            .iter()
            .filter(|link| !self.cache.contains(link))
            .map(|link| link.to_string())
            .collect();
        let reused = links.len() - pending.len();

        let workers = self.concurrency.min(pending.len());
        let cursor = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        debug!(
            links = links.len(),
            pending = pending.len(),
            workers,
            "starting detail enrichment"
        );

        let (queue, cursor_ref, failed_ref, cache) = (&pending, &cursor, &failed, &self.cache);
        let worker = move |worker_id: usize| async move {
            while let Some(link) = queue.get(cursor_ref.fetch_add(1, Ordering::Relaxed)) {
                let info = match Self::fetch_detail(transport, link).await {
                    Ok(info) => info,
                    Err(e) => {
                        warn!(worker_id, link = link.as_str(), error = %e, "detail fetch failed");
                        failed_ref.fetch_add(1, Ordering::Relaxed);
                        DetailInfo::default()
                    }
                };
                cache.insert(link.clone(), info);
            }
        };
        join_all((0..workers).map(worker)).await;

        for record in records.iter_mut() {
            let Some(link) = record.detail_url.as_deref() else {
                continue;
            };
            let info = self.cache.get(link).unwrap_or_default();
            record.apply_detail(&info);
        }

        let stats = EnrichStats {
            fetched: pending.len(),
            failed: failed.load(Ordering::Relaxed),
            reused,
        };
        info!(
            fetched = stats.fetched,
            failed = stats.failed,
            reused = stats.reused,
            duration = fmt_duration(start.elapsed()),
            "detail enrichment complete"
        );
        stats
    }
}
