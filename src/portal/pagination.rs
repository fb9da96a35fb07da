//! Pagination discovery and replay.
//!
//! The listing is a classic server-rendered search page: a search form plus a
//! pager form, both posting back to the same action with a page-number field.
//! We capture both forms once, work out which field carries the page number,
//! and replay the query for every page other than the one already loaded.

use html_scraper::{ElementRef, Html, Selector};
use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info, trace};
use url::Url;

use crate::portal::errors::PortalError;
use crate::portal::models::{FormDescriptor, HttpMethod, LectureRecord, PageMetadata};
use crate::portal::rows::{LECTURE_CELLS, parse_rows};
use crate::portal::transport::{PageRequest, Transport};
use crate::utils::{fmt_duration, normalize_text};

/// Field name used when no strategy can identify the page field.
pub const DEFAULT_PAGE_FIELD: &str = "pageNo";

// ---------------------------------------------------------------------------
// Status text
// ---------------------------------------------------------------------------

static TOTAL_ITEMS_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"共\s*(\d+)\s*条",
        r"(?i)\b(\d+)\s+(?:items|records|results)\b",
        r"(?i)\btotal\s*[:：]?\s*(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static PAGE_POSITION_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"第\s*(\d+)\s*/\s*(\d+)\s*页",
        r"第\s*(\d+)\s*页\s*[,，/]?\s*共\s*(\d+)\s*页",
        r"(\d+)\s*/\s*(\d+)\s*页",
        r"(?i)\bpage\s+(\d+)\s+of\s+(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static TOTAL_PAGES_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"共\s*(\d+)\s*页").unwrap());

/// Whether `el` is a lecture row; its cells are content, not pager status.
fn is_lecture_row(el: ElementRef<'_>) -> bool {
    el.value().name() == "tr"
        && el
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|cell| cell.value().name() == "td")
            .count()
            >= LECTURE_CELLS
}

/// Page text that can carry pager status, whitespace-normalized.
///
/// Skips `<script>`/`<style>` and lecture rows, so titles like "Part 2 of 40"
/// are never read as a page count.
fn visible_text(html: &Html) -> String {
    let mut out = String::new();
    for node in html.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().filter_map(ElementRef::wrap).any(|el| {
            matches!(el.value().name(), "script" | "style") || is_lecture_row(el)
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    normalize_text(&out)
}

/// Pager state read from the page's status text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PagerStatus {
    pub total_items: Option<u32>,
    pub current_page: Option<u32>,
    pub total_pages: Option<u32>,
}

/// Match the status text against the known "N items" and "page X of Y" shapes.
pub fn parse_status(text: &str) -> PagerStatus {
    let total_items = TOTAL_ITEMS_RES
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps[1].parse().ok());

    let position = PAGE_POSITION_RES
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| Some((caps[1].parse().ok()?, caps[2].parse().ok()?)));

    let (current_page, total_pages) = match position {
        Some((current, total)) => (Some(current), Some(total)),
        None => (
            None,
            TOTAL_PAGES_ONLY_RE
                .captures(text)
                .and_then(|caps| caps[1].parse().ok()),
        ),
    };

    PagerStatus {
        total_items,
        current_page,
        total_pages,
    }
}

// ---------------------------------------------------------------------------
// Forms
// ---------------------------------------------------------------------------

static FORM_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").unwrap());
static CONTROL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input, select, textarea").unwrap());
static OPTION_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("option").unwrap());
static SCRIPT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());

/// One `<form>` as found on the page.
#[derive(Debug, Clone, Default)]
struct FormSnapshot {
    action: Option<String>,
    method: Option<String>,
    fields: IndexMap<String, String>,
}

/// Value a `<select>` would submit: the selected option, else the first.
fn select_value(select: ElementRef<'_>) -> String {
    let options: Vec<ElementRef<'_>> = select.select(&OPTION_SEL).collect();
    let chosen = options
        .iter()
        .find(|o| o.attr("selected").is_some())
        .or(options.first());
    match chosen {
        Some(option) => match option.attr("value") {
            Some(value) => value.to_string(),
            None => normalize_text(&option.text().collect::<String>()),
        },
        None => String::new(),
    }
}

/// Collect the named, successful controls of a form in document order.
fn extract_form_fields(form: ElementRef<'_>) -> IndexMap<String, String> {
    let mut fields = IndexMap::new();

    for control in form.select(&CONTROL_SEL) {
        let name = match control.attr("name") {
            Some(n) if !n.is_empty() => n,
            _ => continue,
        };

        let value = match control.value().name() {
            "select" => select_value(control),
            "textarea" => control.text().collect::<String>(),
            _ => {
                let input_type = control.attr("type").unwrap_or("text").to_lowercase();
                match input_type.as_str() {
                    // Only sent when clicked, or not representable as a field
                    "submit" | "image" | "button" | "reset" | "file" => continue,
                    "checkbox" | "radio" if control.attr("checked").is_none() => continue,
                    "checkbox" | "radio" => control.attr("value").unwrap_or("on").to_string(),
                    _ => control.attr("value").unwrap_or_default().to_string(),
                }
            }
        };

        fields.insert(name.to_string(), value);
    }

    fields
}

fn snapshot_forms(html: &Html) -> Vec<FormSnapshot> {
    html.select(&FORM_SEL)
        .map(|form| FormSnapshot {
            action: form
                .attr("action")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from),
            method: form.attr("method").map(|m| m.trim().to_ascii_lowercase()),
            fields: extract_form_fields(form),
        })
        .collect()
}

/// POST if either form asks for it, GET if either explicitly asks for GET,
/// POST when neither says anything.
fn resolve_method(forms: &[&FormSnapshot]) -> HttpMethod {
    let declares = |wanted: &str| forms.iter().any(|f| f.method.as_deref() == Some(wanted));
    if declares("post") {
        HttpMethod::Post
    } else if declares("get") {
        HttpMethod::Get
    } else {
        HttpMethod::Post
    }
}

// ---------------------------------------------------------------------------
// Page field strategies
// ---------------------------------------------------------------------------

/// What a [`PageFieldStrategy`] gets to look at.
pub struct PageFieldContext<'a> {
    /// Text of every inline `<script>` on the page.
    pub scripts: &'a [String],
    /// Field names across all forms, in document order.
    pub field_names: &'a [String],
}

impl PageFieldContext<'_> {
    fn has_field(&self, name: &str) -> bool {
        self.field_names.iter().any(|f| f == name)
    }
}

/// One way of working out which form field selects the page.
pub trait PageFieldStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn detect(&self, ctx: &PageFieldContext<'_>) -> Option<String>;
}

/// Reads the page-navigation functions in inline scripts for the field they write.
///
/// Recognizes `getElementById("x")`, `getElementsByName("x")`, `$("#x")`,
/// `[name='x']`, `form.elements["x"]` and `document.form.x.value`.
pub struct ScriptReference;

static PAGE_FN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:function\s+\w*page\w*\s*\([^)]*\)|\w*page\w*\s*[=:]\s*function\s*\([^)]*\))\s*\{",
    )
    .unwrap()
});

static FIELD_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"getElementById\(\s*['"]([\w.\-]+)['"]\s*\)"#,
        r#"|getElementsByName\(\s*['"]([\w.\-]+)['"]\s*\)"#,
        r#"|\$\(\s*['"]#([\w\-]+)['"]\s*\)"#,
        r#"|\[\s*name\s*=\s*['"]?([\w.\-]+)['"]?\s*\]"#,
        r#"|\.elements\[\s*['"]([\w.\-]+)['"]\s*\]"#,
        r#"|document\.\w+\.(\w+)\.value"#,
    ))
    .unwrap()
});

/// Slice of `source` from just after `open` (an opening brace) to its matching close.
fn brace_body(source: &str, open: usize) -> &str {
    let mut depth = 0usize;
    for (i, c) in source[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return &source[open + 1..open + i];
                }
            }
            _ => {}
        }
    }
    &source[open + 1..]
}

impl PageFieldStrategy for ScriptReference {
    fn name(&self) -> &'static str {
        "script-reference"
    }

    fn detect(&self, ctx: &PageFieldContext<'_>) -> Option<String> {
        let mut candidates: Vec<&str> = Vec::new();
        for script in ctx.scripts {
            for m in PAGE_FN_RE.find_iter(script) {
                let body = brace_body(script, m.end() - 1);
                for caps in FIELD_REF_RE.captures_iter(body) {
                    if let Some(name) = caps.iter().skip(1).flatten().next() {
                        candidates.push(name.as_str());
                    }
                }
            }
        }

        // A reference to a real form field beats one to an element we can't see.
        candidates
            .iter()
            .find(|name| ctx.has_field(name))
            .or_else(|| {
                candidates
                    .iter()
                    .find(|name| name.to_ascii_lowercase().contains("page"))
            })
            .map(|name| name.to_string())
    }
}

/// Picks the field whose name looks like a page number.
///
/// Exact `pageno`/`pagenum` (case-insensitive) wins; otherwise the first name
/// containing `page`.
pub struct NameHeuristic;

impl PageFieldStrategy for NameHeuristic {
    fn name(&self) -> &'static str {
        "name-heuristic"
    }

    fn detect(&self, ctx: &PageFieldContext<'_>) -> Option<String> {
        ctx.field_names
            .iter()
            .find(|f| matches!(f.to_ascii_lowercase().as_str(), "pageno" | "pagenum"))
            .or_else(|| {
                ctx.field_names
                    .iter()
                    .find(|f| f.to_ascii_lowercase().contains("page"))
            })
            .cloned()
    }
}

/// Ordered page-field strategies plus the name used when all of them miss.
pub struct PageDiscovery {
    pub strategies: Vec<Box<dyn PageFieldStrategy>>,
    pub fallback_field: String,
}

impl Default for PageDiscovery {
    fn default() -> Self {
        Self {
            strategies: vec![Box::new(ScriptReference), Box::new(NameHeuristic)],
            fallback_field: DEFAULT_PAGE_FIELD.to_string(),
        }
    }
}

impl PageDiscovery {
    pub fn with_fallback(fallback_field: impl Into<String>) -> Self {
        Self {
            fallback_field: fallback_field.into(),
            ..Self::default()
        }
    }

    fn detect_page_field(&self, ctx: &PageFieldContext<'_>) -> String {
        for strategy in &self.strategies {
            if let Some(field) = strategy.detect(ctx) {
                debug!(strategy = strategy.name(), field = field.as_str(), "page field detected");
                return field;
            }
        }
        debug!(
            field = self.fallback_field.as_str(),
            "no strategy matched, using fallback page field"
        );
        self.fallback_field.clone()
    }

    /// Capture pager status and the search/pagination forms from the loaded page.
    pub fn discover(&self, html: &Html, origin: &Url) -> PageMetadata {
        let forms = snapshot_forms(html);
        let scripts: Vec<String> = html
            .select(&SCRIPT_SEL)
            .map(|s| s.text().collect::<String>())
            .collect();

        let mut field_names: Vec<String> = Vec::new();
        for form in &forms {
            for name in form.fields.keys() {
                if !field_names.contains(name) {
                    field_names.push(name.clone());
                }
            }
        }

        let page_field = self.detect_page_field(&PageFieldContext {
            scripts: &scripts,
            field_names: &field_names,
        });

        let pager_idx = forms
            .iter()
            .position(|f| f.fields.contains_key(&page_field));
        let search_idx = (0..forms.len()).find(|&i| Some(i) != pager_idx);
        let pager = pager_idx.map(|i| &forms[i]);
        let search = search_idx.map(|i| &forms[i]);

        let present: Vec<&FormSnapshot> = [search, pager].into_iter().flatten().collect();
        let mut fields = IndexMap::new();
        for form in &present {
            for (name, value) in &form.fields {
                fields.insert(name.clone(), value.clone());
            }
        }

        let action = pager
            .and_then(|f| f.action.as_deref())
            .or_else(|| search.and_then(|f| f.action.as_deref()))
            .and_then(|a| origin.join(a).ok())
            .unwrap_or_else(|| origin.clone());

        let method = resolve_method(&present);
        let status = parse_status(&visible_text(html));

        let total_pages = status.total_pages.unwrap_or(1).max(1);
        let current_page = status
            .current_page
            .or_else(|| fields.get(&page_field).and_then(|v| v.trim().parse().ok()))
            .unwrap_or(1)
            .clamp(1, total_pages);

        PageMetadata {
            total_pages,
            current_page,
            total_items: status.total_items,
            origin: origin.to_string(),
            form: FormDescriptor {
                action: action.to_string(),
                method,
                fields,
                page_field,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// Build the replay request for `page`.
pub fn page_request(metadata: &PageMetadata, page: u32) -> PageRequest {
    PageRequest {
        method: metadata.form.method,
        url: metadata.form.action.clone(),
        fields: metadata.form.fields_for_page(page),
    }
}

fn parse_page_body(body: &str, url: &str, table_selector: &str) -> Vec<LectureRecord> {
    let html = Html::parse_document(body);
    let base = Url::parse(url).ok();
    parse_rows(&html, base.as_ref(), table_selector)
}

/// Fetch every page other than the loaded one and merge their rows.
///
/// Pages are requested one at a time in ascending order. The rows already in
/// hand for the loaded page come first, whatever its number. Any non-success
/// response aborts the walk.
pub async fn walk_pages<T: Transport + ?Sized>(
    transport: &T,
    metadata: &PageMetadata,
    current_rows: Vec<LectureRecord>,
    table_selector: &str,
) -> Result<Vec<LectureRecord>, PortalError> {
    let start = Instant::now();
    let mut all = current_rows;

    for page in 1..=metadata.total_pages {
        if page == metadata.current_page {
            continue;
        }

        debug!(page, total_pages = metadata.total_pages, "fetching page");
        let fetched = transport.send(page_request(metadata, page)).await?;
        if !fetched.is_success() {
            return Err(PortalError::PageFetch {
                page,
                status: fetched.status,
            });
        }

        let rows = parse_page_body(&fetched.body, &fetched.url, table_selector);
        trace!(page, rows = rows.len(), "page parsed");
        all.extend(rows);
    }

    info!(
        pages = metadata.total_pages,
        lectures = all.len(),
        duration = fmt_duration(start.elapsed()),
        "pagination complete"
    );
    Ok(all)
}
