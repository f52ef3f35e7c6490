use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::time::Duration;

use super::fetcher::fetch_feed;
use crate::model::{AggregateSnapshot, FeedDescriptor, NewsItem, RelayList};

/// Result of a "load more" round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMore {
    /// New items were merged into a fresh snapshot.
    Extended(AggregateSnapshot),
    /// The source had nothing further; callers stop asking.
    Exhausted,
}

/// Fetches every feed concurrently and merges the results into one
/// snapshot, newest first.
///
/// All feeds are in flight at once and the call waits for each of them to
/// finish; a failed feed simply contributes nothing. When no feed yields
/// anything, `fallback` becomes the snapshot so callers never receive an
/// empty first load.
pub async fn refresh(
    client: &reqwest::Client,
    descriptors: &[FeedDescriptor],
    relays: &RelayList,
    timeout: Duration,
    fallback: &[NewsItem],
) -> AggregateSnapshot {
    let total = descriptors.len();

    // `buffered` keeps configuration order, which makes tie order deterministic.
    let per_feed: Vec<Vec<NewsItem>> = stream::iter(descriptors.iter().cloned())
        .map(|descriptor| {
            let client = client.clone();
            let relays = relays.clone();
            async move { fetch_feed(&client, &descriptor, &relays, timeout).await }
        })
        .buffered(total.max(1))
        .collect()
        .await;

    let succeeded = per_feed.iter().filter(|items| !items.is_empty()).count();
    let snapshot = merge_results(per_feed, fallback, Utc::now());

    tracing::info!(
        succeeded = succeeded,
        total = total,
        items = snapshot.len(),
        fallback = succeeded == 0,
        "Refresh complete"
    );

    snapshot
}

/// Concatenates per-feed results in the given order and sorts by
/// `published_at`, newest first. The sort is stable, so items sharing a
/// timestamp keep their concatenation order.
pub fn merge_results(
    per_feed: Vec<Vec<NewsItem>>,
    fallback: &[NewsItem],
    captured_at: DateTime<Utc>,
) -> AggregateSnapshot {
    let mut items: Vec<NewsItem> = per_feed.into_iter().flatten().collect();

    if items.is_empty() {
        tracing::warn!(
            placeholders = fallback.len(),
            "No feed produced items, using placeholder content"
        );
        items = fallback.to_vec();
    }

    sort_newest_first(&mut items);
    AggregateSnapshot { items, captured_at }
}

/// Appends `additional` to `previous` and re-sorts. Duplicates are kept.
///
/// Returns [`LoadMore::Exhausted`] when `additional` is empty.
pub fn extend_snapshot(
    previous: &AggregateSnapshot,
    additional: Vec<NewsItem>,
    now: DateTime<Utc>,
) -> LoadMore {
    if additional.is_empty() {
        return LoadMore::Exhausted;
    }

    let mut items = Vec::with_capacity(previous.items.len() + additional.len());
    items.extend(previous.items.iter().cloned());
    items.extend(additional);
    sort_newest_first(&mut items);

    LoadMore::Extended(AggregateSnapshot {
        items,
        captured_at: now,
    })
}

fn sort_newest_first(items: &mut [NewsItem]) {
    // slice::sort_by is stable
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}
