//! Aggregates AI news from many RSS/Atom feeds fetched through public relays,
//! normalizes them into one item model, and serves a cached, filterable view.
//!
//! The pipeline runs relay fallback ([`feed::fetch_through_relays`]) into the
//! normalizer ([`feed::parse_items`]) and the aggregator ([`feed::refresh`]),
//! then through the snapshot cache ([`storage::Database`]). [`view::project`]
//! derives the visible subset. [`dashboard::Dashboard`] ties these together
//! for a caller.

pub mod config;
pub mod dashboard;
pub mod feed;
pub mod model;
pub mod storage;
pub mod util;
pub mod view;
