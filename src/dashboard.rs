//! Caller-side state around the pipeline: the current snapshot, the active
//! category tab and search text, and the guards that keep refreshes from
//! overlapping.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::redirect::Policy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::config::Config;
use crate::feed::{self, LoadMore};
use crate::model::{AggregateSnapshot, CategoryFilter, NewsItem};
use crate::storage::Database;
use crate::view;

const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; newsdeck/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("A refresh is already in progress")]
    RefreshInProgress,

    #[error("Nothing loaded yet, refresh first")]
    NotLoaded,

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Source of extra items for "load more".
#[async_trait]
pub trait MoreItemsSource: Send + Sync {
    /// Items to append to `snapshot`. An empty result means there is nothing
    /// further, ever.
    async fn fetch_more(&self, snapshot: &AggregateSnapshot) -> Vec<NewsItem>;
}

/// Default source: there is never anything more.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMoreItems;

#[async_trait]
impl MoreItemsSource for NoMoreItems {
    async fn fetch_more(&self, _snapshot: &AggregateSnapshot) -> Vec<NewsItem> {
        Vec::new()
    }
}

#[derive(Debug, Default)]
struct ViewState {
    snapshot: Option<AggregateSnapshot>,
    filter: CategoryFilter,
    query: String,
}

impl ViewState {
    fn visible(&self) -> Vec<NewsItem> {
        match &self.snapshot {
            Some(snapshot) => view::project(snapshot, self.filter, &self.query)
                .into_iter()
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Held for the duration of a refresh or load-more; clears the flag on drop.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, DashboardError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| DashboardError::RefreshInProgress)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Dashboard {
    config: Arc<Config>,
    client: reqwest::Client,
    cache: Option<Database>,
    more: Box<dyn MoreItemsSource>,
    state: Mutex<ViewState>,
    busy: AtomicBool,
    more_exhausted: AtomicBool,
}

impl Dashboard {
    /// Build a dashboard with its own HTTP client. `cache` is optional; without
    /// it every refresh goes to the network.
    pub fn new(config: Arc<Config>, cache: Option<Database>) -> Result<Self, DashboardError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(create_redirect_policy())
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(std::time::Duration::from_secs(30))
            .tcp_keepalive(std::time::Duration::from_secs(60))
            .build()?;

        Ok(Self {
            config,
            client,
            cache,
            more: Box::new(NoMoreItems),
            state: Mutex::new(ViewState::default()),
            busy: AtomicBool::new(false),
            more_exhausted: AtomicBool::new(false),
        })
    }

    /// Replace the "load more" source.
    pub fn with_more_source(mut self, source: impl MoreItemsSource + 'static) -> Self {
        self.more = Box::new(source);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load a snapshot, from the cache when it is fresh and `force_bypass_cache`
    /// is false, otherwise from every feed. Returns the visible items.
    ///
    /// # Errors
    ///
    /// `DashboardError::RefreshInProgress` if another refresh or load-more is
    /// running.
    pub async fn refresh(&self, force_bypass_cache: bool) -> Result<Vec<NewsItem>, DashboardError> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let config = &self.config;

        if !force_bypass_cache {
            if let Some(cache) = &self.cache {
                let cached = cache
                    .get_snapshot(&config.cache_key, config.cache_ttl())
                    .await;
                if let Some(snapshot) = cached {
                    tracing::info!(
                        items = snapshot.len(),
                        captured_at = %snapshot.captured_at,
                        "Using cached snapshot"
                    );
                    return Ok(self.install(snapshot));
                }
            }
        }

        let snapshot = feed::refresh(
            &self.client,
            &config.feeds,
            &config.relay_list(),
            config.request_timeout(),
            &config.fallback_items(Utc::now()),
        )
        .await;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put_snapshot(&config.cache_key, &snapshot).await {
                tracing::warn!(error = %e, "Failed to cache snapshot");
            }
        }

        Ok(self.install(snapshot))
    }

    /// Ask the more-items source for additional items and merge them in.
    ///
    /// Once the source comes back empty this returns [`LoadMore::Exhausted`]
    /// forever without asking it again.
    ///
    /// # Errors
    ///
    /// `DashboardError::NotLoaded` before the first refresh,
    /// `DashboardError::RefreshInProgress` while a refresh is running.
    pub async fn load_more(&self) -> Result<LoadMore, DashboardError> {
        let _busy = BusyGuard::acquire(&self.busy)?;

        let current = self.lock_state().snapshot.clone().ok_or(DashboardError::NotLoaded)?;

        if self.more_exhausted.load(Ordering::Acquire) {
            return Ok(LoadMore::Exhausted);
        }

        let additional = self.more.fetch_more(&current).await;
        let outcome = feed::extend_snapshot(&current, additional, Utc::now());

        match &outcome {
            LoadMore::Extended(snapshot) => {
                tracing::info!(
                    added = snapshot.len() - current.len(),
                    total = snapshot.len(),
                    "Loaded more items"
                );
                self.install(snapshot.clone());
            }
            LoadMore::Exhausted => {
                tracing::info!("No more items available");
                self.more_exhausted.store(true, Ordering::Release);
            }
        }

        Ok(outcome)
    }

    pub fn set_category(&self, filter: CategoryFilter) -> Vec<NewsItem> {
        let mut state = self.lock_state();
        state.filter = filter;
        state.visible()
    }

    pub fn set_search_query(&self, query: &str) -> Vec<NewsItem> {
        let mut state = self.lock_state();
        state.query = query.to_string();
        state.visible()
    }

    /// Current snapshot projected through the active filter and query.
    pub fn visible(&self) -> Vec<NewsItem> {
        self.lock_state().visible()
    }

    pub fn snapshot(&self) -> Option<AggregateSnapshot> {
        self.lock_state().snapshot.clone()
    }

    pub fn is_exhausted(&self) -> bool {
        self.more_exhausted.load(Ordering::Acquire)
    }

    fn install(&self, snapshot: AggregateSnapshot) -> Vec<NewsItem> {
        let mut state = self.lock_state();
        state.snapshot = Some(snapshot);
        state.visible()
    }

    fn lock_state(&self) -> MutexGuard<'_, ViewState> {
        // ViewState has no invariants a panicked writer could break.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Follow at most 3 redirects and stop on loops.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(to = %url, hop = attempt.previous().len() + 1, "Following redirect");
        attempt.follow()
    })
}
