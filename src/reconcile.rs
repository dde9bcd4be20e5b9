use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::models::{CandidateEvent, EventRecord, EventStatus};

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Counts describing what a reconciliation pass did to the catalog.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub refreshed: usize,
    pub inactivated: usize,
    pub rejected: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Nothing admissible was scraped; the catalog must be left as it is.
    NoOp { rejected: usize },
    Merged {
        catalog: Vec<EventRecord>,
        summary: SyncSummary,
    },
}

/// Merges a scraped batch for `target_city` into `catalog`.
///
/// Matching is by `originalUrl` against records of the target city only, so
/// records of other cities always pass through untouched. New records are
/// placed ahead of the existing ones.
pub fn reconcile(
    catalog: &[EventRecord],
    scraped: Vec<CandidateEvent>,
    target_city: &str,
    now: DateTime<Utc>,
) -> ReconcileOutcome {
    let mut summary = SyncSummary::default();
    let admitted = admit(scraped, target_city, &mut summary);
    if admitted.is_empty() {
        return ReconcileOutcome::NoOp {
            rejected: summary.rejected,
        };
    }

    let mut existing = catalog.to_vec();
    let mut by_url: HashMap<String, usize> = HashMap::new();
    for (idx, record) in existing.iter().enumerate() {
        if record.city == target_city {
            by_url.entry(record.original_url.clone()).or_insert(idx);
        }
    }
    let mut taken_ids: HashSet<String> = existing.iter().map(|r| r.id.clone()).collect();
    let seen: HashSet<String> = admitted.iter().map(|c| c.original_url.clone()).collect();

    let mut created = Vec::new();
    for candidate in admitted {
        match by_url.get(&candidate.original_url) {
            Some(&idx) => {
                let record = &mut existing[idx];
                let changed = record.key_fields_differ(&candidate);
                let next = record.status.rescraped(changed);
                if changed && next == EventStatus::Updated {
                    summary.updated += 1;
                } else {
                    summary.refreshed += 1;
                }
                record.status = next;
                record.absorb(candidate);
                record.last_scraped_at = now;
            }
            None => {
                let id = unique_event_id(&candidate.original_url, now, &mut taken_ids);
                created.push(EventRecord::from_candidate(id, candidate, now));
                summary.created += 1;
            }
        }
    }

    for record in existing.iter_mut() {
        if record.city != target_city || seen.contains(&record.original_url) {
            continue;
        }
        let next = record.status.missing();
        if next != record.status {
            record.status = next;
            summary.inactivated += 1;
        }
    }

    let mut merged = created;
    merged.extend(existing);
    ReconcileOutcome::Merged {
        catalog: merged,
        summary,
    }
}

fn admit(
    scraped: Vec<CandidateEvent>,
    target_city: &str,
    summary: &mut SyncSummary,
) -> Vec<CandidateEvent> {
    let mut seen = HashSet::new();
    let mut admitted = Vec::with_capacity(scraped.len());
    for candidate in scraped {
        if let Some(field) = candidate.missing_field() {
            warn!(
                city = %target_city,
                field,
                url = %candidate.original_url,
                "rejecting incomplete candidate"
            );
            summary.rejected += 1;
            continue;
        }
        if !seen.insert(candidate.original_url.clone()) {
            debug!(city = %target_city, url = %candidate.original_url, "dropping duplicate candidate");
            summary.duplicates += 1;
            continue;
        }
        admitted.push(candidate);
    }
    admitted
}

/// Generates an id unique within the process and absent from `taken`.
fn unique_event_id(original_url: &str, now: DateTime<Utc>, taken: &mut HashSet<String>) -> String {
    loop {
        let id = next_event_id(original_url, now);
        if taken.insert(id.clone()) {
            return id;
        }
    }
}

pub fn next_event_id(original_url: &str, now: DateTime<Utc>) -> String {
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(original_url.as_bytes());
    hasher.update(b"|");
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(b"|");
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(b"|");
    hasher.update(seq.to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("evt-{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, minute, 0).unwrap()
    }

    fn candidate(url: &str, title: &str, date_time: &str, city: &str) -> CandidateEvent {
        CandidateEvent {
            title: title.into(),
            date_time: date_time.into(),
            venue_name: "Hall".into(),
            city: city.into(),
            original_url: url.into(),
            ..Default::default()
        }
    }

    fn record(url: &str, city: &str, status: EventStatus) -> EventRecord {
        let mut record = EventRecord::from_candidate(
            format!("id-{url}"),
            candidate(url, "Jazz Night", "Fri", city),
            at(0),
        );
        record.status = status;
        record
    }

    fn merged(outcome: ReconcileOutcome) -> (Vec<EventRecord>, SyncSummary) {
        match outcome {
            ReconcileOutcome::Merged { catalog, summary } => (catalog, summary),
            ReconcileOutcome::NoOp { .. } => panic!("expected a merge"),
        }
    }

    fn find<'a>(catalog: &'a [EventRecord], url: &str) -> &'a EventRecord {
        catalog.iter().find(|r| r.original_url == url).unwrap()
    }

    #[test]
    fn first_sighting_creates_new_record() {
        let scraped = vec![candidate("u1", "Jazz Night", "Fri", "Sydney")];
        let (catalog, summary) = merged(reconcile(&[], scraped, "Sydney", at(5)));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].status, EventStatus::New);
        assert_eq!(catalog[0].last_scraped_at, at(5));
        assert!(catalog[0].id.starts_with("evt-"));
        assert_eq!(summary.created, 1);
    }

    #[test]
    fn changed_title_marks_updated_and_keeps_id() {
        let existing = vec![record("u1", "Sydney", EventStatus::New)];
        let scraped = vec![candidate("u1", "Jazz Night (Rescheduled)", "Sat", "Sydney")];
        let (catalog, summary) = merged(reconcile(&existing, scraped, "Sydney", at(5)));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].id, "id-u1");
        assert_eq!(catalog[0].status, EventStatus::Updated);
        assert_eq!(catalog[0].title, "Jazz Night (Rescheduled)");
        assert_eq!(summary.updated, 1);
    }

    #[test]
    fn descriptive_change_alone_keeps_status() {
        let existing = vec![record("u1", "Sydney", EventStatus::New)];
        let mut fresh = candidate("u1", "Jazz Night", "Fri", "Sydney");
        fresh.description = "Now with a brass section".into();
        let (catalog, summary) = merged(reconcile(&existing, vec![fresh], "Sydney", at(5)));
        assert_eq!(catalog[0].status, EventStatus::New);
        assert_eq!(catalog[0].description, "Now with a brass section");
        assert_eq!(catalog[0].last_scraped_at, at(5));
        assert_eq!(summary.refreshed, 1);
    }

    #[test]
    fn imported_record_stays_imported_when_changed_or_missing() {
        let mut curated = record("u2", "Sydney", EventStatus::Imported);
        curated.imported_by = Some("editor".into());
        let existing = vec![curated, record("u5", "Sydney", EventStatus::Imported)];
        let scraped = vec![candidate("u2", "Different", "Sun", "Sydney")];
        let (catalog, _) = merged(reconcile(&existing, scraped, "Sydney", at(5)));
        let u2 = find(&catalog, "u2");
        assert_eq!(u2.status, EventStatus::Imported);
        assert_eq!(u2.imported_by.as_deref(), Some("editor"));
        assert_eq!(find(&catalog, "u5").status, EventStatus::Imported);
    }

    #[test]
    fn missing_new_record_becomes_inactive() {
        let existing = vec![
            record("u3", "Sydney", EventStatus::New),
            record("u6", "Sydney", EventStatus::Inactive),
        ];
        let scraped = vec![candidate("u1", "Jazz Night", "Fri", "Sydney")];
        let (catalog, summary) = merged(reconcile(&existing, scraped, "Sydney", at(5)));
        assert_eq!(find(&catalog, "u3").status, EventStatus::Inactive);
        assert_eq!(find(&catalog, "u6").status, EventStatus::Inactive);
        assert_eq!(find(&catalog, "u3").last_scraped_at, at(0));
        assert_eq!(summary.inactivated, 1);
    }

    #[test]
    fn other_cities_pass_through_untouched() {
        let melbourne = record("u4", "Melbourne", EventStatus::New);
        let existing = vec![melbourne.clone()];
        let scraped = vec![candidate("u1", "Jazz Night", "Fri", "Sydney")];
        let (catalog, _) = merged(reconcile(&existing, scraped, "Sydney", at(5)));
        assert_eq!(find(&catalog, "u4"), &melbourne);
    }

    #[test]
    fn same_url_in_other_city_is_not_matched() {
        let melbourne = record("u1", "Melbourne", EventStatus::New);
        let existing = vec![melbourne.clone()];
        let scraped = vec![candidate("u1", "Other Title", "Sat", "Sydney")];
        let (catalog, summary) = merged(reconcile(&existing, scraped, "Sydney", at(5)));
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[1], melbourne);
        assert_eq!(catalog[0].city, "Sydney");
        assert_eq!(summary.created, 1);
    }

    #[test]
    fn empty_scrape_is_a_no_op() {
        let existing = vec![record("u3", "Sydney", EventStatus::New)];
        let outcome = reconcile(&existing, Vec::new(), "Sydney", at(5));
        assert_eq!(outcome, ReconcileOutcome::NoOp { rejected: 0 });
    }

    #[test]
    fn incomplete_candidates_are_rejected() {
        let existing = vec![record("u3", "Sydney", EventStatus::New)];
        let scraped = vec![
            candidate("", "No Url", "Fri", "Sydney"),
            candidate("u9", " ", "Fri", "Sydney"),
        ];
        let outcome = reconcile(&existing, scraped, "Sydney", at(5));
        assert_eq!(outcome, ReconcileOutcome::NoOp { rejected: 2 });

        let scraped = vec![
            candidate("u9", "", "Fri", "Sydney"),
            candidate("u1", "Jazz Night", "Fri", "Sydney"),
        ];
        let (catalog, summary) = merged(reconcile(&existing, scraped, "Sydney", at(5)));
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.created, 1);
        assert!(catalog.iter().all(|r| r.original_url != "u9"));
    }

    #[test]
    fn duplicate_urls_in_batch_keep_first() {
        let scraped = vec![
            candidate("u1", "First", "Fri", "Sydney"),
            candidate("u1", "Second", "Sat", "Sydney"),
        ];
        let (catalog, summary) = merged(reconcile(&[], scraped, "Sydney", at(5)));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].title, "First");
        assert_eq!(summary.duplicates, 1);
    }

    #[test]
    fn new_records_are_prepended_in_scrape_order() {
        let existing = vec![record("u3", "Sydney", EventStatus::Imported)];
        let scraped = vec![
            candidate("a", "A", "Fri", "Sydney"),
            candidate("b", "B", "Fri", "Sydney"),
            candidate("u3", "Jazz Night", "Fri", "Sydney"),
        ];
        let (catalog, _) = merged(reconcile(&existing, scraped, "Sydney", at(5)));
        let urls: Vec<_> = catalog.iter().map(|r| r.original_url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b", "u3"]);
    }

    #[test]
    fn reconciling_twice_only_advances_timestamps() {
        let existing = vec![
            record("u1", "Sydney", EventStatus::New),
            record("u3", "Sydney", EventStatus::Updated),
            record("u4", "Melbourne", EventStatus::New),
        ];
        let scraped = vec![
            candidate("u1", "Jazz Night (Late)", "Fri", "Sydney"),
            candidate("u7", "Opera", "Sat", "Sydney"),
        ];
        let (once, _) = merged(reconcile(&existing, scraped.clone(), "Sydney", at(5)));
        let (twice, summary) = merged(reconcile(&once, scraped, "Sydney", at(10)));
        assert_eq!(summary.created, 0);
        assert_eq!(summary.inactivated, 0);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            let mut a = a.clone();
            if a.city == "Sydney" && a.status != EventStatus::Inactive {
                a.last_scraped_at = at(10);
            }
            assert_eq!(&a, b);
        }
    }

    #[test]
    fn ids_are_unique_across_calls() {
        let mut ids = HashSet::new();
        for _ in 0..50 {
            let scraped = vec![candidate("same-url", "T", "D", "Sydney")];
            let (catalog, _) = merged(reconcile(&[], scraped, "Sydney", at(0)));
            assert!(ids.insert(catalog[0].id.clone()));
        }
    }
}
