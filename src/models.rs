use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    New,
    Updated,
    Inactive,
    Imported,
}

impl EventStatus {
    pub const ALL: [EventStatus; 4] = [
        EventStatus::New,
        EventStatus::Updated,
        EventStatus::Inactive,
        EventStatus::Imported,
    ];

    /// Status after the event shows up again in a scrape of its city.
    pub fn rescraped(self, key_fields_changed: bool) -> Self {
        match self {
            EventStatus::Imported => EventStatus::Imported,
            _ if key_fields_changed => EventStatus::Updated,
            other => other,
        }
    }

    /// Status after a scrape of the event's own city no longer lists it.
    pub fn missing(self) -> Self {
        match self {
            EventStatus::New | EventStatus::Updated => EventStatus::Inactive,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::New => "new",
            EventStatus::Updated => "updated",
            EventStatus::Inactive => "inactive",
            EventStatus::Imported => "imported",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(EventStatus::New),
            "updated" => Ok(EventStatus::Updated),
            "inactive" => Ok(EventStatus::Inactive),
            "imported" => Ok(EventStatus::Imported),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

/// A freshly fetched event that has not been merged into the catalog yet.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CandidateEvent {
    pub title: String,
    pub date_time: String,
    pub iso_date: String,
    pub venue_name: String,
    pub address: String,
    pub city: String,
    pub description: String,
    pub category: String,
    pub image_url: String,
    pub source_website: String,
    pub original_url: String,
}

impl CandidateEvent {
    /// Missing required field, if any. Title, human date and url must be non-blank.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.original_url.trim().is_empty() {
            Some("originalUrl")
        } else if self.title.trim().is_empty() {
            Some("title")
        } else if self.date_time.trim().is_empty() {
            Some("dateTime")
        } else {
            None
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: String,
    pub title: String,
    pub date_time: String,
    pub iso_date: String,
    pub venue_name: String,
    pub address: String,
    pub city: String,
    pub description: String,
    pub category: String,
    pub image_url: String,
    pub source_website: String,
    pub original_url: String,
    pub last_scraped_at: DateTime<Utc>,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_notes: Option<String>,
}

impl EventRecord {
    pub fn from_candidate(
        id: String,
        candidate: CandidateEvent,
        scraped_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: candidate.title,
            date_time: candidate.date_time,
            iso_date: candidate.iso_date,
            venue_name: candidate.venue_name,
            address: candidate.address,
            city: candidate.city,
            description: candidate.description,
            category: candidate.category,
            image_url: candidate.image_url,
            source_website: candidate.source_website,
            original_url: candidate.original_url,
            last_scraped_at: scraped_at,
            status: EventStatus::New,
            imported_at: None,
            imported_by: None,
            import_notes: None,
        }
    }

    /// True when the fields curators care about differ from the candidate.
    pub fn key_fields_differ(&self, candidate: &CandidateEvent) -> bool {
        self.date_time != candidate.date_time
            || self.venue_name != candidate.venue_name
            || self.title != candidate.title
    }

    /// Overwrites every descriptive field from a re-scraped candidate. Identity,
    /// status and curation metadata are left alone.
    pub fn absorb(&mut self, candidate: CandidateEvent) {
        self.title = candidate.title;
        self.date_time = candidate.date_time;
        self.iso_date = candidate.iso_date;
        self.venue_name = candidate.venue_name;
        self.address = candidate.address;
        self.city = candidate.city;
        self.description = candidate.description;
        self.category = candidate.category;
        self.image_url = candidate.image_url;
        self.source_website = candidate.source_website;
        self.original_url = candidate.original_url;
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub picture: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TicketLead {
    pub email: String,
    pub consent: bool,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imported_survives_every_automated_transition() {
        assert_eq!(EventStatus::Imported.rescraped(true), EventStatus::Imported);
        assert_eq!(EventStatus::Imported.rescraped(false), EventStatus::Imported);
        assert_eq!(EventStatus::Imported.missing(), EventStatus::Imported);
    }

    #[test]
    fn transition_table() {
        assert_eq!(EventStatus::New.rescraped(true), EventStatus::Updated);
        assert_eq!(EventStatus::New.rescraped(false), EventStatus::New);
        assert_eq!(EventStatus::Inactive.rescraped(true), EventStatus::Updated);
        assert_eq!(EventStatus::Inactive.rescraped(false), EventStatus::Inactive);
        assert_eq!(EventStatus::New.missing(), EventStatus::Inactive);
        assert_eq!(EventStatus::Updated.missing(), EventStatus::Inactive);
        assert_eq!(EventStatus::Inactive.missing(), EventStatus::Inactive);
    }

    #[test]
    fn record_serializes_with_camel_case_keys() {
        let candidate = CandidateEvent {
            title: "Jazz Night".into(),
            date_time: "Fri".into(),
            original_url: "u1".into(),
            ..Default::default()
        };
        let record = EventRecord::from_candidate("evt-1".into(), candidate, Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["originalUrl"], "u1");
        assert_eq!(value["dateTime"], "Fri");
        assert_eq!(value["status"], "new");
        assert!(value.get("importedAt").is_none());
    }

    #[test]
    fn candidate_requires_url_title_and_date() {
        let mut candidate = CandidateEvent {
            title: "Jazz Night".into(),
            date_time: "Fri".into(),
            original_url: "u1".into(),
            ..Default::default()
        };
        assert_eq!(candidate.missing_field(), None);
        candidate.date_time = "   ".into();
        assert_eq!(candidate.missing_field(), Some("dateTime"));
        candidate.original_url.clear();
        assert_eq!(candidate.missing_field(), Some("originalUrl"));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Imported".parse::<EventStatus>(), Ok(EventStatus::Imported));
        assert!("archived".parse::<EventStatus>().is_err());
    }
}
