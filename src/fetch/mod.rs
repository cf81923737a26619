//! Authenticated, rate-limited, retrying HTTP fetch

pub mod client;
pub mod endpoints;
pub mod rate_limit;
pub mod retry;

pub use client::{build_http_client, FetchClient, FetchedPage};
pub use endpoints::{page_type_of, page_urls, view_url, PageType};
pub use rate_limit::RateLimiter;
pub use retry::{with_retry, RetryPolicy};
