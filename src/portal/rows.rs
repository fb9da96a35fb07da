//! Lecture table row parser.
//!
//! The listing renders one lecture per `<tr>` with eight cells in a fixed
//! order: topic, title, credits, time, audience, speaker, department and an
//! action cell holding the detail link. Header and decoration rows share the
//! same table, so anything whose time cell doesn't parse is dropped quietly.

use html_scraper::{ElementRef, Html, Selector};
use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;
use url::Url;

use crate::portal::models::{CivilDateTime, LectureRecord};
use crate::utils::normalize_text;

/// Number of cells a lecture row must carry.
pub const LECTURE_CELLS: usize = 8;

/// Default selector for the lecture table.
pub const DEFAULT_TABLE_SELECTOR: &str = "table";

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2}) (\d{2}):(\d{2})-(\d{2}):(\d{2})$").unwrap()
});

static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Parse a time cell like `2024-05-01 10:00-11:30` into start and end.
///
/// The cell must match the shape exactly (after whitespace normalization) and
/// describe a real date and real times.
pub fn parse_time_range(text: &str) -> Option<(CivilDateTime, CivilDateTime)> {
    let caps = TIME_RE.captures(text)?;
    let num = |i: usize| caps[i].parse::<u32>().ok();

    let year = caps[1].parse::<i32>().ok()?;
    let (month, day) = (num(2)?, num(3)?);
    let start = CivilDateTime::new(year, month, day, num(4)?, num(5)?);
    let end = CivilDateTime::new(year, month, day, num(6)?, num(7)?);

    start.to_naive()?;
    end.to_naive()?;
    Some((start, end))
}

/// Leading integer of the credits cell, 0 when there is none.
fn parse_credits(text: &str) -> i32 {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// Extract the detail link from the action cell, resolved against `base`.
fn detail_link(cell: ElementRef<'_>, base: Option<&Url>) -> Option<String> {
    let href = cell
        .select(&LINK_SEL)
        .filter_map(|a| a.attr("href"))
        .map(str::trim)
        .find(|href| {
            !href.is_empty()
                && !href.starts_with('#')
                && !href.to_ascii_lowercase().starts_with("javascript:")
        })?;

    match base {
        Some(base) => base.join(href).ok().map(String::from),
        None => Some(href.to_string()),
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    normalize_text(&cell.text().collect::<String>())
}

/// Build a record from one table row, or `None` if the row isn't a lecture.
fn parse_row(row: ElementRef<'_>, base: Option<&Url>) -> Option<LectureRecord> {
    let cells: Vec<ElementRef<'_>> = row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "td")
        .collect();
    if cells.len() < LECTURE_CELLS {
        return None;
    }

    let time_text = cell_text(cells[3]);
    let Some((start, end)) = parse_time_range(&time_text) else {
        trace!(time = time_text.as_str(), "dropping row with unparsable time cell");
        return None;
    };

    Some(LectureRecord {
        id: 0,
        topic: cell_text(cells[0]),
        title: cell_text(cells[1]),
        credits: parse_credits(&cell_text(cells[2])),
        time_text,
        start,
        end,
        start_timestamp: None,
        end_timestamp: None,
        audience: cell_text(cells[4]),
        speaker: cell_text(cells[5]),
        department: cell_text(cells[6]),
        detail_url: detail_link(cells[7], base),
        description: None,
        main_venue: None,
        branch_venue: None,
    })
}

/// Parse every lecture row of `html` in document order.
///
/// `table_selector` narrows which tables are scanned; an invalid selector
/// falls back to [`DEFAULT_TABLE_SELECTOR`]. Ids are provisional (position
/// within this document) until the merged set is normalized.
pub fn parse_rows(html: &Html, base: Option<&Url>, table_selector: &str) -> Vec<LectureRecord> {
    let table_sel = Selector::parse(table_selector)
        .or_else(|_| Selector::parse(DEFAULT_TABLE_SELECTOR))
        .expect("default table selector is valid");

    let mut seen = std::collections::HashSet::new();
    let mut records = Vec::new();

    for table in html.select(&table_sel) {
        for row in table.select(&ROW_SEL) {
            // Nested tables would otherwise yield the same row twice.
            if !seen.insert(row.id()) {
                continue;
            }
            if let Some(mut record) = parse_row(row, base) {
                record.id = records.len() as u32;
                records.push(record);
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    /// (topic, title, credits, time, audience, speaker, department, href)
    type Row<'a> = (
        &'a str,
        &'a str,
        &'a str,
        &'a str,
        &'a str,
        &'a str,
        &'a str,
        Option<&'a str>,
    );

    fn build_table(rows: &[Row<'_>]) -> String {
        let mut html = String::from(
            "<html><body><table><tr><th>主题</th><th>题目</th><th>学分</th><th>时间</th></tr>",
        );
        for (topic, title, credits, time, audience, speaker, dept, href) in rows {
            let action = match href {
                Some(href) => format!(r#"<a href="{href}">查看</a>"#),
                None => String::new(),
            };
            html.push_str(&format!(
                "<tr><td>{topic}</td><td>{title}</td><td>{credits}</td><td>{time}</td>\
                 <td>{audience}</td><td>{speaker}</td><td>{dept}</td><td>{action}</td></tr>"
            ));
        }
        html.push_str("</table></body></html>");
        html
    }

    // --- parse_time_range ---

    #[test]
    fn test_parse_time_range_valid() {
        let (start, end) = parse_time_range("2024-05-01 10:00-11:30").unwrap();
        assert_eq!(start, CivilDateTime::new(2024, 5, 1, 10, 0));
        assert_eq!(end, CivilDateTime::new(2024, 5, 1, 11, 30));
    }

    #[test]
    fn test_parse_time_range_rejects_loose_shapes() {
        assert!(parse_time_range("2024-5-1 10:00-11:30").is_none());
        assert!(parse_time_range("2024-05-01 10:00 - 11:30").is_none());
        assert!(parse_time_range("2024-05-01 10:00").is_none());
        assert!(parse_time_range("时间").is_none());
        assert!(parse_time_range("").is_none());
    }

    #[test]
    fn test_parse_time_range_rejects_impossible_values() {
        assert!(parse_time_range("2024-13-01 10:00-11:00").is_none());
        assert!(parse_time_range("2024-05-01 25:00-26:00").is_none());
    }

    // --- parse_credits ---

    #[test]
    fn test_parse_credits() {
        assert_eq!(parse_credits("2"), 2);
        assert_eq!(parse_credits(" 1.5 "), 1);
        assert_eq!(parse_credits("无"), 0);
        assert_eq!(parse_credits(""), 0);
    }

    // --- parse_rows ---

    #[test]
    fn test_parse_rows_extracts_fields() {
        let html = Html::parse_document(&build_table(&[(
            "  人工智能\n 前沿 ",
            "大模型的未来",
            "2",
            "2024-05-01   10:00-11:30",
            "全体研究生",
            "张三 教授",
            "计算机学院",
            Some("/lecture/detail?id=7"),
        )]));
        let base = Url::parse("https://gs.example.edu/lecture/list").unwrap();
        let records = parse_rows(&html, Some(&base), DEFAULT_TABLE_SELECTOR);

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.topic, "人工智能 前沿");
        assert_eq!(r.title, "大模型的未来");
        assert_eq!(r.credits, 2);
        assert_eq!(r.time_text, "2024-05-01 10:00-11:30");
        assert_eq!(r.start, CivilDateTime::new(2024, 5, 1, 10, 0));
        assert_eq!(r.end, CivilDateTime::new(2024, 5, 1, 11, 30));
        assert_eq!(r.audience, "全体研究生");
        assert_eq!(r.speaker, "张三 教授");
        assert_eq!(r.department, "计算机学院");
        assert_eq!(
            r.detail_url.as_deref(),
            Some("https://gs.example.edu/lecture/detail?id=7")
        );
        assert!(r.description.is_none());
    }

    #[test]
    fn test_parse_rows_drops_bad_time_rows_silently() {
        let html = Html::parse_document(&build_table(&[
            ("A", "T1", "1", "2024-05-01 10:00-11:00", "", "", "", None),
            ("B", "T2", "1", "待定", "", "", "", None),
            ("C", "T3", "1", "2024-05-02 14:00-15:00", "", "", "", None),
        ]));
        let records = parse_rows(&html, None, DEFAULT_TABLE_SELECTOR);
        let topics: Vec<&str> = records.iter().map(|r| r.topic.as_str()).collect();
        assert_eq!(topics, vec!["A", "C"]);
        assert_eq!(records[1].id, 1);
    }

    #[test]
    fn test_parse_rows_skips_short_rows() {
        let html = Html::parse_document(
            "<table><tr><td>A</td><td>2024-05-01 10:00-11:00</td></tr></table>",
        );
        assert!(parse_rows(&html, None, DEFAULT_TABLE_SELECTOR).is_empty());
    }

    #[test]
    fn test_parse_rows_empty_document() {
        let html = Html::parse_document("");
        assert!(parse_rows(&html, None, DEFAULT_TABLE_SELECTOR).is_empty());
    }

    #[test]
    fn test_parse_rows_ignores_javascript_links() {
        let html = Html::parse_document(&build_table(&[(
            "A",
            "T",
            "1",
            "2024-05-01 10:00-11:00",
            "",
            "",
            "",
            Some("javascript:void(0)"),
        )]));
        let records = parse_rows(&html, None, DEFAULT_TABLE_SELECTOR);
        assert_eq!(records.len(), 1);
        assert!(records[0].detail_url.is_none());
    }

    #[test]
    fn test_parse_rows_respects_table_selector() {
        let html = Html::parse_document(
            r#"<table id="nav"><tr><td>x</td><td>x</td><td>1</td><td>2024-05-01 10:00-11:00</td>
               <td>x</td><td>x</td><td>x</td><td></td></tr></table>
               <table id="lectures"><tr><td>L</td><td>T</td><td>1</td><td>2024-05-01 10:00-11:00</td>
               <td>a</td><td>s</td><td>d</td><td></td></tr></table>"#,
        );
        let records = parse_rows(&html, None, "table#lectures");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].topic, "L");
    }

    #[test]
    fn test_parse_rows_nested_tables_not_duplicated() {
        let html = Html::parse_document(
            r#"<table><tr><td><table><tr><td>L</td><td>T</td><td>1</td><td>2024-05-01 10:00-11:00</td>
               <td>a</td><td>s</td><td>d</td><td></td></tr></table></td></tr></table>"#,
        );
        assert_eq!(parse_rows(&html, None, DEFAULT_TABLE_SELECTOR).len(), 1);
    }
}
