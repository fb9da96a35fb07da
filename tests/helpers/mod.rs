//! Scripted transport and page builders shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use lectern::config::Config;
use lectern::portal::{FetchedPage, PageRequest, PortalError, Transport};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const ORIGIN: &str = "https://gs.example.edu/lecture/list.do";
pub const PAGE_FIELD: &str = "pageNo";

/// Route key for a request: the URL, plus `?pageNo=N` for form replays.
pub fn route_key(request: &PageRequest) -> String {
    match request.fields.get(PAGE_FIELD) {
        Some(page) => format!("{}?{PAGE_FIELD}={page}", request.url),
        None => request.url.clone(),
    }
}

pub fn page_key(page: u32) -> String {
    format!("{ORIGIN}?{PAGE_FIELD}={page}")
}

pub fn detail_url(id: u32) -> String {
    format!("https://gs.example.edu/lecture/detail.do?id={id}")
}

/// Serves canned bodies by route key and records what was asked of it.
///
/// Unknown routes answer 404.
#[derive(Default)]
pub struct MockTransport {
    routes: HashMap<String, (u16, String)>,
    delay: Duration,
    requests: Mutex<Vec<PageRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every response for `delay` so concurrent requests overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn route(mut self, key: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        self.routes.insert(key.into(), (status, body.into()));
        self
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.requests().iter().map(route_key).collect()
    }

    pub fn count(&self, key: &str) -> usize {
        self.keys().iter().filter(|k| *k == key).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: PageRequest) -> Result<FetchedPage, PortalError> {
        let key = route_key(&request);
        self.requests.lock().unwrap().push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let (status, body) = self
            .routes
            .get(&key)
            .cloned()
            .unwrap_or_else(|| (404, "<html><body>Not Found</body></html>".to_string()));
        Ok(FetchedPage {
            status,
            url: request.url,
            body,
        })
    }
}

/// One listing row: title and optional detail id. Every row is on 2024-05-`day`.
pub struct Row {
    pub title: String,
    pub day: u32,
    pub detail: Option<u32>,
}

pub fn row(title: &str, day: u32, detail: Option<u32>) -> Row {
    Row {
        title: title.to_string(),
        day,
        detail,
    }
}

/// A listing page with a search form, a pager form and a status line.
pub fn listing_page(current: u32, total: u32, rows: &[Row]) -> String {
    let mut table = String::from("<tr><th>主题</th><th>题目</th><th>学分</th><th>时间</th></tr>");
    for r in rows {
        let link = r
            .detail
            .map(|id| format!(r#"<a href="detail.do?id={id}">查看</a>"#))
            .unwrap_or_default();
        table.push_str(&format!(
            "<tr><td>Science</td><td>{}</td><td>2</td><td>2024-05-{:02} 14:00-15:30</td>\
             <td>All students</td><td>Dr. Wang</td><td>Graduate School</td><td>{link}</td></tr>",
            r.title, r.day
        ));
    }
    format!(
        r#"<html><body>
        <form id="search" action="list.do" method="post">
            <input type="text" name="keyword" value="">
            <input type="submit" value="Search">
        </form>
        <table class="list">{table}</table>
        <form id="pager" action="list.do" method="post">
            <input type="hidden" name="{PAGE_FIELD}" value="{current}">
        </form>
        <div class="pager">共 {items} 条记录 第 {current} / {total} 页</div>
        </body></html>"#,
        items = rows.len() as u32 * total,
    )
}

pub fn detail_page(intro: &str, main: &str, branch: &str) -> String {
    format!(
        "<html><body><table>\
         <tr><td>讲座介绍</td></tr>\
         <tr><td>{intro}</td></tr>\
         <tr><td>主会场地点：{main} 分会场地点：{branch}</td></tr>\
         </table></body></html>"
    )
}

pub fn config_with_concurrency(concurrency: usize) -> Config {
    Config {
        detail_concurrency: concurrency,
        ..Config::default()
    }
}
