mod dedupe;
mod fetcher;
mod rss;
mod web;

pub use dedupe::{dedupe, external_id, IdentityFallback};
pub use fetcher::{HttpFetcher, SourceFetcher};
pub use rss::parse_feed;
pub use web::extract_page;
