//! Error types for the lecture portal client.

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    /// The listing page the pass starts from could not be loaded.
    #[error("Failed to fetch listing page (HTTP {status})")]
    ListingFetch { status: u16 },
    /// A pagination replay came back with a non-success status. Fatal to the pass.
    #[error("Failed to fetch page {page} (HTTP {status})")]
    PageFetch { page: u32, status: u16 },
    /// A detail page came back with a non-success status. Absorbed by the enricher.
    #[error("Failed to fetch detail page (HTTP {status})")]
    DetailFetch { status: u16 },
    #[error("Invalid URL `{url}`")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}
