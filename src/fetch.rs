use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info};

use crate::models::CandidateEvent;
use crate::utils;

const DEFAULT_ADDRESS: &str = "Central Location";
const DEFAULT_DESCRIPTION: &str = "No description available.";
const DEFAULT_CATEGORY: &str = "General";
const DEFAULT_IMAGE_URL: &str =
    "https://images.unsplash.com/photo-1533174072545-7a4b6ad7a6c3?w=800&q=80";
const DEFAULT_SOURCE: &str = "Discovery Service";

/// Source of candidate events for a city.
#[async_trait]
pub trait EventFetcher: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, city: &str) -> Result<Vec<CandidateEvent>>;
}

/// Fetches for `city`, turning any failure into an empty batch.
pub async fn fetch_or_empty(fetcher: &dyn EventFetcher, city: &str) -> Vec<CandidateEvent> {
    match fetcher.fetch(city).await {
        Ok(events) => events,
        Err(err) => {
            error!(fetcher = fetcher.name(), city = %city, "fetch failed: {err:#}");
            Vec::new()
        }
    }
}

/// An item as written by the discovery job. Only url, title and date are
/// expected; everything else may be absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawEvent {
    pub title: Option<String>,
    pub date_time: Option<String>,
    pub iso_date: Option<String>,
    pub venue_name: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub source_website: Option<String>,
    pub original_url: Option<String>,
}

impl RawEvent {
    pub fn into_candidate(self, city: &str) -> CandidateEvent {
        CandidateEvent {
            title: self.title.unwrap_or_default(),
            date_time: self.date_time.unwrap_or_default(),
            iso_date: or_default(self.iso_date, || Utc::now().to_rfc3339()),
            venue_name: self.venue_name.unwrap_or_default(),
            address: or_default(self.address, || DEFAULT_ADDRESS.to_string()),
            city: city.to_string(),
            description: or_default(self.description, || DEFAULT_DESCRIPTION.to_string()),
            category: or_default(self.category, || DEFAULT_CATEGORY.to_string()),
            image_url: or_default(self.image_url, || DEFAULT_IMAGE_URL.to_string()),
            source_website: or_default(self.source_website, || DEFAULT_SOURCE.to_string()),
            original_url: self.original_url.unwrap_or_default(),
        }
    }
}

fn or_default(value: Option<String>, fallback: impl FnOnce() -> String) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(fallback)
}

/// Reads `<dir>/<city-slug>.json`, a JSON array of discovered events.
pub struct FeedDirFetcher {
    dir: PathBuf,
}

impl FeedDirFetcher {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn feed_path(&self, city: &str) -> PathBuf {
        self.dir.join(format!("{}.json", utils::slug(city)))
    }
}

#[async_trait]
impl EventFetcher for FeedDirFetcher {
    fn name(&self) -> &'static str {
        "feed_dir"
    }

    async fn fetch(&self, city: &str) -> Result<Vec<CandidateEvent>> {
        let path = self.feed_path(city);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            info!(city = %city, path = %path.display(), "no feed file for city");
            return Ok(Vec::new());
        }
        let body = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("unable to read feed {}", path.display()))?;
        let raw: Vec<RawEvent> = serde_json::from_str(&body)
            .with_context(|| format!("malformed feed {}", path.display()))?;
        Ok(raw.into_iter().map(|item| item.into_candidate(city)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl EventFetcher for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn fetch(&self, _city: &str) -> Result<Vec<CandidateEvent>> {
            anyhow::bail!("upstream unavailable")
        }
    }

    #[tokio::test]
    async fn failure_becomes_empty_batch() {
        assert!(fetch_or_empty(&Failing, "Sydney").await.is_empty());
    }

    #[tokio::test]
    async fn reads_feed_and_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("gold-coast.json"),
            r#"[{"title":"Surf Fest","dateTime":"Sat 2pm","venueName":"Beach","originalUrl":"https://x/1","address":"  "}]"#,
        )
        .unwrap();
        let fetcher = FeedDirFetcher::new(dir.path().to_path_buf());
        let events = fetcher.fetch("Gold Coast").await.unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.city, "Gold Coast");
        assert_eq!(event.address, DEFAULT_ADDRESS);
        assert_eq!(event.category, DEFAULT_CATEGORY);
        assert_eq!(event.source_website, DEFAULT_SOURCE);
        assert!(!event.iso_date.is_empty());
    }

    #[tokio::test]
    async fn missing_feed_is_empty_and_malformed_feed_errors() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FeedDirFetcher::new(dir.path().to_path_buf());
        assert!(fetcher.fetch("Perth").await.unwrap().is_empty());

        std::fs::write(dir.path().join("perth.json"), "{\"oops\":").unwrap();
        assert!(fetcher.fetch("Perth").await.is_err());
        assert!(fetch_or_empty(&fetcher, "Perth").await.is_empty());
    }
}
