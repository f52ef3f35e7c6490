use chrono::Utc;
use std::time::Duration;
use thiserror::Error;

use super::parser::{parse_items, ParseError, ParseResult};
use super::relay::{fetch_through_relays_with, FetchError};
use crate::model::{FeedDescriptor, NewsItem, RelayList};

/// Why one feed produced no items.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Fetches and normalizes one feed. Never fails: any relay or parse error is
/// logged and yields an empty list, so one broken feed cannot disturb its
/// siblings.
pub async fn fetch_feed(
    client: &reqwest::Client,
    descriptor: &FeedDescriptor,
    relays: &RelayList,
    timeout: Duration,
) -> Vec<NewsItem> {
    match try_fetch_feed(client, descriptor, relays, timeout).await {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(
                feed = %descriptor.name,
                url = %descriptor.url,
                error = %e,
                "Feed failed, no items"
            );
            Vec::new()
        }
    }
}

/// Like [`fetch_feed`] but reports why a feed failed.
///
/// A relay whose payload does not parse counts as failed and the next relay
/// is tried.
///
/// # Errors
///
/// - [`FeedError::Parse`] when every relay failed and at least one of them
///   answered with something that is not a readable feed (the last such
///   parse error is reported)
/// - [`FeedError::Fetch`] when every relay failed at the transport level
pub async fn try_fetch_feed(
    client: &reqwest::Client,
    descriptor: &FeedDescriptor,
    relays: &RelayList,
    timeout: Duration,
) -> Result<Vec<NewsItem>, FeedError> {
    let mut last_parse_error = None;
    let outcome = fetch_through_relays_with(client, &descriptor.url, relays, timeout, |body| {
        parse_items(&body, descriptor, Utc::now()).map_err(|e| {
            let message = e.to_string();
            last_parse_error = Some(e);
            message
        })
    })
    .await;

    let hit = match (outcome, last_parse_error) {
        (Ok(hit), _) => hit,
        (Err(FetchError::RelaysExhausted(_)), Some(parse)) => return Err(parse.into()),
        (Err(e), _) => return Err(e.into()),
    };
    let ParseResult { items, skipped } = hit.body;

    if skipped > 0 {
        tracing::warn!(
            feed = %descriptor.name,
            skipped = skipped,
            "Entries without title or link skipped"
        );
    }
    tracing::info!(
        feed = %descriptor.name,
        relay = hit.relay_index + 1,
        items = items.len(),
        "Fetched feed"
    );

    Ok(items)
}
