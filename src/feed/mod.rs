//! Feed acquisition and normalization pipeline.
//!
//! - [`relay`] - ordered relay fallback for a single fetch
//! - [`fetcher`] - one feed through the relays and into the normalizer
//! - [`parser`] - RSS/Atom/JSON Feed markup to [`NewsItem`](crate::model::NewsItem)s
//! - [`aggregator`] - all feeds concurrently, merged and sorted
//!
//! # Example
//!
//! ```ignore
//! use newsdeck::feed::refresh;
//!
//! let snapshot = refresh(&client, &config.feeds, &config.relay_list(),
//!     config.request_timeout(), &config.fallback_items(Utc::now())).await;
//! ```

mod aggregator;
mod extract;
mod fetcher;
mod parser;
mod relay;

pub use aggregator::{extend_snapshot, merge_results, refresh, LoadMore};
pub use extract::{extract_author, extract_image, parse_timestamp};
pub use fetcher::{fetch_feed, try_fetch_feed, FeedError};
pub use parser::{parse_items, ParseError, ParseResult};
pub use relay::{
    fetch_through_relays, fetch_through_relays_with, relay_url, unwrap_envelope, FetchError,
    RelayHit,
};
