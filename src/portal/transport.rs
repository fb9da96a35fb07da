//! HTTP seam between the pipeline and the lecture portal.
//!
//! Every request the pipeline makes goes through [`Transport`], so the page
//! walker and detail enricher can be driven by a scripted transport in tests.

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::portal::errors::PortalError;
use crate::portal::models::HttpMethod;

/// A request against the portal: a detail GET or a form replay.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub method: HttpMethod,
    pub url: String,
    pub fields: IndexMap<String, String>,
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            fields: IndexMap::new(),
        }
    }
}

/// A response body together with the URL it was finally served from.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    /// Final URL after redirects, used to resolve relative links on the page.
    pub url: String,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a request. Non-success statuses are returned, not raised; callers
    /// decide which error they map to.
    async fn send(&self, request: PageRequest) -> Result<FetchedPage, PortalError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: PageRequest) -> Result<FetchedPage, PortalError> {
        (**self).send(request).await
    }
}

/// Settings for the reqwest-backed transport.
#[derive(Debug, Clone, Default)]
pub struct HttpSettings {
    pub user_agent: Option<String>,
    /// Raw `Cookie` header sent with every request, for sessions copied from a browser.
    pub cookie: Option<String>,
    pub timeout: Option<Duration>,
}

/// [`Transport`] backed by a cookie-aware `reqwest::Client`.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(settings: &HttpSettings) -> Result<Self, PortalError> {
        let mut headers = HeaderMap::new();
        if let Some(agent) = settings.user_agent.as_deref()
            && let Ok(value) = HeaderValue::from_str(agent)
        {
            headers.insert(USER_AGENT, value);
        }
        if let Some(cookie) = settings.cookie.as_deref()
            && let Ok(mut value) = HeaderValue::from_str(cookie)
        {
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let mut builder = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers);
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
        })
    }
}

impl HttpTransport {
    /// Fields go in the query string for GET and in a urlencoded body for POST.
    fn build_request(&self, request: &PageRequest) -> Result<reqwest::Request, PortalError> {
        let builder = match request.method {
            HttpMethod::Get if request.fields.is_empty() => self.http.get(&request.url),
            HttpMethod::Get => self.http.get(&request.url).query(&request.fields),
            HttpMethod::Post => self.http.post(&request.url).form(&request.fields),
        };
        Ok(builder.build()?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: PageRequest) -> Result<FetchedPage, PortalError> {
        let resp = self.http.execute(self.build_request(&request)?).await?;
        let status = resp.status().as_u16();
        let url = resp.url().to_string();
        let body = resp.text().await?;

        trace!(
            method = ?request.method,
            url = url.as_str(),
            status,
            bytes = body.len(),
            "portal response"
        );

        Ok(FetchedPage { status, url, body })
    }
}
