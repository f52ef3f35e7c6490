//! Configuration file parser for ~/.config/newsdeck/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which carries the stock AI news feeds and relays. Unknown keys are
//! accepted but logged, and feeds/relays are validated once here so the
//! pipeline can trust them.
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::model::{Category, FeedDescriptor, NewsItem, RelayList, UNKNOWN_AUTHOR};
use crate::util::{validate_feed_url, validate_relay_template};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Upper bound for configured ages and TTLs (100 years); keeps chrono
/// duration arithmetic in range.
const MAX_AGE_MINUTES: i64 = 100 * 365 * 24 * 60;

// ============================================================================
// Configuration Structs
// ============================================================================

/// Placeholder story shown when every feed fails.
///
/// `age_hours` is relative to the refresh that needs it, so placeholders
/// always look recent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FallbackItem {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub summary: String,
    pub source: String,
    #[serde(alias = "type")]
    pub category: Category,
    #[serde(default)]
    pub age_hours: i64,
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Subscriptions, in display and tie-break order.
    pub feeds: Vec<FeedDescriptor>,

    /// Relay templates; the first is primary, the rest are fallbacks.
    pub relays: Vec<String>,

    /// Minutes a cached snapshot stays fresh.
    pub cache_ttl_minutes: u64,

    /// Cache slot the snapshot is stored under.
    pub cache_key: String,

    /// Per relay attempt, in seconds.
    pub request_timeout_secs: u64,

    /// Items shown per page by the terminal client.
    pub items_per_page: usize,

    pub fallback: Vec<FallbackItem>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feeds: default_feeds(),
            relays: vec![
                "https://corsproxy.io/?".to_string(),
                "https://api.allorigins.win/get?url=".to_string(),
                "https://cors-anywhere.herokuapp.com/".to_string(),
                "https://thingproxy.freeboard.io/fetch/".to_string(),
            ],
            cache_ttl_minutes: 120,
            cache_key: "ai_news_cache".to_string(),
            request_timeout_secs: 15,
            items_per_page: 50,
            fallback: default_fallback(),
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "feeds",
        "relays",
        "cache_ttl_minutes",
        "cache_key",
        "request_timeout_secs",
        "items_per_page",
        "fallback",
    ];

    /// Load and validate configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Bad feed/relay URLs, empty relay list, zero timeout → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            feeds = config.feeds.len(),
            relays = config.relays.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses and validates TOML text. Blank text yields the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relays.is_empty() {
            return Err(ConfigError::Invalid("at least one relay is required".into()));
        }
        for relay in &self.relays {
            validate_relay_template(relay)
                .map_err(|e| ConfigError::Invalid(format!("relay '{relay}': {e}")))?;
        }

        let mut seen = HashSet::new();
        for feed in &self.feeds {
            if feed.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "feed with url '{}' has an empty name",
                    feed.url
                )));
            }
            validate_feed_url(&feed.url)
                .map_err(|e| ConfigError::Invalid(format!("feed '{}': {e}", feed.name)))?;
            if !seen.insert(feed.name.as_str()) {
                tracing::warn!(feed = %feed.name, "Duplicate feed name in config");
            }
        }
        if self.feeds.is_empty() {
            tracing::warn!("No feeds configured, only placeholder content will be shown");
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be > 0".into()));
        }
        if self.cache_key.trim().is_empty() {
            return Err(ConfigError::Invalid("cache_key must not be empty".into()));
        }
        Ok(())
    }

    pub fn relay_list(&self) -> RelayList {
        RelayList::new(self.relays.iter().map(|r| r.trim()))
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        let minutes = i64::try_from(self.cache_ttl_minutes).unwrap_or(MAX_AGE_MINUTES);
        chrono::Duration::minutes(minutes.min(MAX_AGE_MINUTES))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Placeholder items timestamped relative to `now`.
    pub fn fallback_items(&self, now: DateTime<Utc>) -> Vec<NewsItem> {
        self.fallback
            .iter()
            .map(|f| NewsItem {
                title: f.title.clone(),
                url: f.url.clone(),
                summary: f.summary.clone(),
                source: f.source.clone(),
                category: f.category,
                published_at: now
                    - chrono::Duration::hours(f.age_hours.clamp(0, MAX_AGE_MINUTES / 60)),
                image_url: None,
                author: UNKNOWN_AUTHOR.to_string(),
            })
            .collect()
    }
}

fn default_feeds() -> Vec<FeedDescriptor> {
    vec![
        FeedDescriptor::new(
            "MIT Technology Review",
            "https://www.technologyreview.com/topic/artificial-intelligence/feed",
            Category::News,
        ),
        FeedDescriptor::new(
            "VentureBeat AI",
            "https://venturebeat.com/category/ai/feed/",
            Category::News,
        ),
        FeedDescriptor::new(
            "TechCrunch AI",
            "https://techcrunch.com/category/artificial-intelligence/feed/",
            Category::News,
        ),
        FeedDescriptor::new(
            "Google AI Blog",
            "https://ai.googleblog.com/feeds/posts/default",
            Category::Blogs,
        ),
        FeedDescriptor::new("OpenAI Blog", "https://openai.com/blog/rss.xml", Category::Blogs),
        FeedDescriptor::new(
            "DeepMind Blog",
            "https://deepmind.com/blog/feed/basic/",
            Category::Blogs,
        ),
        FeedDescriptor::new(
            "Anthropic Blog",
            "https://www.anthropic.com/feed.xml",
            Category::Blogs,
        ),
        FeedDescriptor::new(
            "Towards Data Science",
            "https://towardsdatascience.com/feed",
            Category::Blogs,
        ),
        FeedDescriptor::new("ArXiv AI", "https://arxiv.org/rss/cs.AI", Category::Papers),
        FeedDescriptor::new(
            "ArXiv Machine Learning",
            "https://arxiv.org/rss/cs.LG",
            Category::Papers,
        ),
    ]
}

fn default_fallback() -> Vec<FallbackItem> {
    let item = |title: &str, url: &str, summary: &str, source: &str, category, age_hours| {
        FallbackItem {
            title: title.to_string(),
            url: url.to_string(),
            summary: summary.to_string(),
            source: source.to_string(),
            category,
            age_hours,
        }
    };
    vec![
        item(
            "OpenAI Releases GPT-4 Turbo with Improved Performance",
            "https://openai.com/blog/gpt-4-turbo",
            "OpenAI has announced the release of GPT-4 Turbo, featuring improved performance and reduced costs.",
            "OpenAI Blog",
            Category::Blogs,
            2,
        ),
        item(
            "Google Introduces Gemini Pro for Advanced AI Tasks",
            "https://ai.googleblog.com/2023/12/gemini-pro.html",
            "Google's latest AI model Gemini Pro offers enhanced capabilities for complex reasoning tasks.",
            "Google AI Blog",
            Category::Blogs,
            4,
        ),
        item(
            "MIT Researchers Develop New Approach to AI Safety",
            "https://www.technologyreview.com/2023/12/ai-safety-research",
            "A team at MIT has developed a novel framework for ensuring AI systems behave safely and predictably.",
            "MIT Technology Review",
            Category::News,
            6,
        ),
        item(
            "DeepMind's AlphaFold 3 Shows Breakthrough in Protein Structure Prediction",
            "https://deepmind.com/blog/alphafold-3",
            "The latest version of AlphaFold demonstrates unprecedented accuracy in predicting protein structures.",
            "DeepMind Blog",
            Category::Blogs,
            8,
        ),
        item(
            "New Research: Attention Mechanisms in Large Language Models",
            "https://arxiv.org/abs/2312.12345",
            "A comprehensive study on attention mechanisms and their role in transformer-based language models.",
            "ArXiv AI",
            Category::Papers,
            12,
        ),
        item(
            "VentureBeat: AI Startups Raise Record Funding in Q4 2023",
            "https://venturebeat.com/ai-funding-q4-2023",
            "AI startups have raised over $15 billion in the fourth quarter, marking a new record.",
            "VentureBeat AI",
            Category::News,
            24,
        ),
    ]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("newsdeck_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.feeds.len(), 10);
        assert_eq!(config.relays.len(), 4);
        assert_eq!(config.relay_list().primary(), Some("https://corsproxy.io/?"));
        assert_eq!(config.cache_ttl(), chrono::Duration::hours(2));
        assert_eq!(config.cache_key, "ai_news_cache");
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.items_per_page, 50);
        assert_eq!(config.fallback.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/newsdeck_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.feeds.len(), 10);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = write_config("whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.cache_key, "ai_news_cache");
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let path = write_config("partial", "cache_ttl_minutes = 5\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.cache_ttl(), chrono::Duration::minutes(5));
        assert_eq!(config.feeds.len(), 10); // default
        assert_eq!(config.request_timeout_secs, 15); // default
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_full_config() {
        let content = r#"
relays = ["https://api.allorigins.win/get?url=", "http://127.0.0.1:8080/?"]
cache_ttl_minutes = 30
cache_key = "custom"
request_timeout_secs = 10
items_per_page = 20

[[feeds]]
name = "ArXiv AI"
url = "https://arxiv.org/rss/cs.AI"
type = "papers"

[[feeds]]
name = "OpenAI Blog"
url = "https://openai.com/blog/rss.xml"
category = "blogs"

[[fallback]]
title = "Placeholder"
url = "https://example.com/placeholder"
source = "Local"
category = "news"
age_hours = 3
"#;
        let config = Config::from_toml(content).unwrap();
        assert_eq!(config.feeds.len(), 2);
        assert_eq!(config.feeds[0].category, Category::Papers);
        assert_eq!(config.feeds[1].category, Category::Blogs);
        assert_eq!(config.relay_list().len(), 2);
        assert_eq!(config.cache_key, "custom");
        assert_eq!(config.items_per_page, 20);

        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let fallback = config.fallback_items(now);
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].published_at, now - chrono::Duration::hours(3));
        assert_eq!(fallback[0].author, UNKNOWN_AUTHOR);
        assert_eq!(fallback[0].summary, "");
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::from_toml("theme = \"dark\"\ncache_key = \"k\"\n").unwrap();
        assert_eq!(config.cache_key, "k");
    }

    #[test]
    fn test_unknown_category_rejected() {
        let content = r#"
[[feeds]]
name = "Pod"
url = "https://example.com/pod.xml"
category = "podcasts"
"#;
        assert!(matches!(Config::from_toml(content), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_feed_missing_url_rejected() {
        let content = "[[feeds]]\nname = \"No URL\"\ncategory = \"news\"\n";
        assert!(matches!(Config::from_toml(content), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_private_feed_url_rejected() {
        let content = r#"
[[feeds]]
name = "Router"
url = "http://192.168.1.1/rss"
category = "news"
"#;
        let err = Config::from_toml(content).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("Router"));
    }

    #[test]
    fn test_empty_relays_rejected() {
        assert!(matches!(
            Config::from_toml("relays = []\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("relays = [\"ftp://relay/\"]\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(matches!(
            Config::from_toml("request_timeout_secs = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_blank_feed_name_rejected() {
        let content = "[[feeds]]\nname = \" \"\nurl = \"https://example.com/f\"\ncategory = \"news\"\n";
        assert!(matches!(Config::from_toml(content), Err(ConfigError::Invalid(_))));
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
