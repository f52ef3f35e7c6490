//! Read-only projections over an [`AggregateSnapshot`].

use chrono::{DateTime, Utc};

use crate::model::{AggregateSnapshot, CategoryFilter, NewsItem};

/// Items of `snapshot` that pass `filter` and contain `query`, in snapshot
/// order.
///
/// The query is trimmed and matched case-insensitively against title, summary
/// and author. A blank query matches everything.
pub fn project<'a>(
    snapshot: &'a AggregateSnapshot,
    filter: CategoryFilter,
    query: &str,
) -> Vec<&'a NewsItem> {
    let needle = query.trim().to_lowercase();

    snapshot
        .items
        .iter()
        .filter(|item| filter.matches(item.category))
        .filter(|item| needle.is_empty() || matches_query(item, &needle))
        .collect()
}

fn matches_query(item: &NewsItem, needle: &str) -> bool {
    [&item.title, &item.summary, &item.author]
        .into_iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Date badge for an item: `Today`, `Yesterday`, `N days ago` within a week,
/// then the plain date.
pub fn relative_age(published: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (now - published).num_days();

    match days {
        // Future dates (clock skew, malformed feeds)
        i64::MIN..=0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => format!("{days} days ago"),
        _ => published.format("%Y-%m-%d").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, UNKNOWN_AUTHOR};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn item(title: &str, category: Category, summary: &str, author: &str) -> NewsItem {
        NewsItem {
            title: title.into(),
            url: format!("https://example.com/{}", title.replace(' ', "-")),
            summary: summary.into(),
            source: "Example".into(),
            category,
            published_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            image_url: None,
            author: author.into(),
        }
    }

    fn sample() -> AggregateSnapshot {
        AggregateSnapshot {
            items: vec![
                item("GPT-5 launches", Category::News, "", UNKNOWN_AUTHOR),
                item("Attention revisited", Category::Papers, "transformer study", "Ada Lovelace"),
                item("Scaling notes", Category::Blogs, "we trained gpt models", UNKNOWN_AUTHOR),
                item("Sparse mixtures", Category::Papers, "", "Grace Hopper"),
            ],
            captured_at: Utc.timestamp_opt(1_700_000_100, 0).unwrap(),
        }
    }

    fn titles(items: &[&NewsItem]) -> Vec<String> {
        items.iter().map(|i| i.title.clone()).collect()
    }

    #[test]
    fn test_all_with_blank_query_is_identity() {
        let snapshot = sample();
        let visible = project(&snapshot, CategoryFilter::All, "   ");
        assert_eq!(visible.len(), snapshot.items.len());
        assert!(visible.iter().zip(&snapshot.items).all(|(a, b)| *a == b));
    }

    #[test]
    fn test_category_filter_keeps_order() {
        let snapshot = sample();
        let visible = project(&snapshot, CategoryFilter::Only(Category::Papers), "");
        assert_eq!(titles(&visible), vec!["Attention revisited", "Sparse mixtures"]);
    }

    #[test]
    fn test_search_is_case_insensitive_across_fields() {
        let snapshot = sample();
        let visible = project(&snapshot, CategoryFilter::All, "  GPT ");
        assert_eq!(titles(&visible), vec!["GPT-5 launches", "Scaling notes"]);

        let by_author = project(&snapshot, CategoryFilter::All, "hopper");
        assert_eq!(titles(&by_author), vec!["Sparse mixtures"]);
    }

    #[test]
    fn test_filter_and_search_combine() {
        let snapshot = sample();
        let visible = project(&snapshot, CategoryFilter::Only(Category::Papers), "transformer");
        assert_eq!(titles(&visible), vec!["Attention revisited"]);

        let none = project(&snapshot, CategoryFilter::Only(Category::News), "transformer");
        assert!(none.is_empty());
    }

    #[test]
    fn test_relative_age_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();

        assert_eq!(relative_age(now - Duration::hours(3), now), "Today");
        assert_eq!(relative_age(now + Duration::hours(3), now), "Today");
        assert_eq!(relative_age(now - Duration::hours(30), now), "Yesterday");
        assert_eq!(relative_age(now - Duration::days(6), now), "6 days ago");
        assert_eq!(relative_age(now - Duration::days(7), now), "2024-03-03");
    }
}
