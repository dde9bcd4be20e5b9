use std::{collections::BTreeMap, str::FromStr};

use chrono::{DateTime, LocalResult, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::{EventRecord, EventStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeWindow {
    #[default]
    All,
    Months(u32),
}

impl TimeWindow {
    pub fn limit(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeWindow::All => None,
            TimeWindow::Months(n) => now.checked_add_months(Months::new(*n)),
        }
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(TimeWindow::All),
            "3m" => Ok(TimeWindow::Months(3)),
            "6m" => Ok(TimeWindow::Months(6)),
            "12m" => Ok(TimeWindow::Months(12)),
            other => Err(format!("unknown time window: {other} (expected all, 3m, 6m or 12m)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewQuery {
    pub city: String,
    pub status: Option<EventStatus>,
    pub window: TimeWindow,
}

impl ViewQuery {
    pub fn city(city: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            status: None,
            window: TimeWindow::All,
        }
    }
}

pub fn city_timezone(city: &str) -> Tz {
    match city.trim().to_ascii_lowercase().as_str() {
        "sydney" => chrono_tz::Australia::Sydney,
        "melbourne" => chrono_tz::Australia::Melbourne,
        "brisbane" => chrono_tz::Australia::Brisbane,
        "perth" => chrono_tz::Australia::Perth,
        "adelaide" => chrono_tz::Australia::Adelaide,
        "hobart" => chrono_tz::Australia::Hobart,
        "darwin" => chrono_tz::Australia::Darwin,
        _ => chrono_tz::UTC,
    }
}

/// Parses an event's ISO date. Values without an offset are local to `tz`.
pub fn parse_iso_date(value: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// The admin dashboard listing: one city, optionally one status, optionally a
/// window of upcoming months. Most recently scraped first.
pub fn dashboard_view<'a>(
    catalog: &'a [EventRecord],
    query: &ViewQuery,
    now: DateTime<Utc>,
) -> Vec<&'a EventRecord> {
    let tz = city_timezone(&query.city);
    let limit = query.window.limit(now);
    let mut result: Vec<&EventRecord> = catalog
        .iter()
        .filter(|e| e.city == query.city)
        .filter(|e| query.status.map_or(true, |s| e.status == s))
        .filter(|e| match limit {
            None => true,
            Some(limit) => parse_iso_date(&e.iso_date, tz)
                .map_or(false, |start| start >= now && start <= limit),
        })
        .collect();
    result.sort_by(|a, b| b.last_scraped_at.cmp(&a.last_scraped_at));
    result
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub by_status: BTreeMap<&'static str, usize>,
}

pub fn status_counts(catalog: &[EventRecord], city: &str) -> StatusCounts {
    let mut counts = StatusCounts {
        total: 0,
        by_status: EventStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect(),
    };
    for record in catalog.iter().filter(|e| e.city == city) {
        counts.total += 1;
        *counts.by_status.entry(record.status.as_str()).or_default() += 1;
    }
    counts
}

/// What the public sees: curated events only, filtered by a free-text search
/// over title, venue and category.
pub fn public_feed<'a>(catalog: &'a [EventRecord], search: &str) -> Vec<&'a EventRecord> {
    let needle = search.trim().to_lowercase();
    catalog
        .iter()
        .filter(|e| e.status == EventStatus::Imported)
        .filter(|e| {
            needle.is_empty()
                || e.title.to_lowercase().contains(&needle)
                || e.venue_name.to_lowercase().contains(&needle)
                || e.category.to_lowercase().contains(&needle)
        })
        .collect()
}
