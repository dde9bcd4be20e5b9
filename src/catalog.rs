use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::db::{keys, BlobStore};
use crate::error::{HubError, Result};
use crate::models::{CandidateEvent, EventRecord, EventStatus};
use crate::reconcile::{reconcile, ReconcileOutcome};

/// Typed access to the catalog blob. Every write is a full read-modify-write
/// through [`BlobStore::update`], so concurrent writers never lose each
/// other's changes and the blob is replaced in one statement.
pub struct CatalogRepo {
    store: Arc<dyn BlobStore>,
}

impl CatalogRepo {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Reads the catalog. A missing or corrupt blob reads as empty.
    pub fn load(&self) -> Result<Vec<EventRecord>> {
        Ok(decode(self.store.get(keys::EVENTS)?))
    }

    pub fn update<F, T>(&self, transform: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<EventRecord>) -> Result<T>,
    {
        let mut out = None;
        self.store.update(
            keys::EVENTS,
            Box::new(|raw: Option<String>| -> Result<Option<String>> {
                let mut catalog = decode(raw);
                out = Some(transform(&mut catalog)?);
                Ok(Some(serde_json::to_string(&catalog)?))
            }),
        )?;
        out.ok_or_else(|| HubError::Invalid("catalog update was not applied".into()))
    }

    /// Reconciles a scraped batch against the stored catalog and persists the
    /// result. A no-op outcome leaves storage untouched.
    pub fn apply_scrape(
        &self,
        scraped: Vec<CandidateEvent>,
        city: &str,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        let mut out = None;
        self.store.update(
            keys::EVENTS,
            Box::new(|raw: Option<String>| -> Result<Option<String>> {
                let outcome = reconcile(&decode(raw), scraped, city, now);
                let payload = match &outcome {
                    ReconcileOutcome::Merged { catalog, .. } => {
                        Some(serde_json::to_string(catalog)?)
                    }
                    ReconcileOutcome::NoOp { .. } => None,
                };
                out = Some(outcome);
                Ok(payload)
            }),
        )?;
        out.ok_or_else(|| HubError::Invalid("scrape was not applied".into()))
    }

    /// Manual curation: promotes an event to `imported`.
    pub fn import_event(
        &self,
        id: &str,
        imported_by: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<EventRecord> {
        let record = self.update(|catalog| {
            let record = catalog
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| HubError::NotFound(id.to_string()))?;
            record.status = EventStatus::Imported;
            record.imported_at = Some(now);
            record.imported_by = Some(imported_by.to_string());
            record.import_notes = notes.filter(|n| !n.trim().is_empty());
            Ok(record.clone())
        })?;
        info!(id = %record.id, by = %imported_by, "event imported");
        Ok(record)
    }

    pub fn remove_event(&self, id: &str) -> Result<EventRecord> {
        let removed = self.update(|catalog| {
            let idx = catalog
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| HubError::NotFound(id.to_string()))?;
            Ok(catalog.remove(idx))
        })?;
        info!(id = %removed.id, "event removed from catalog");
        Ok(removed)
    }
}

fn decode(raw: Option<String>) -> Vec<EventRecord> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    serde_json::from_str(&raw).unwrap_or_else(|err| {
        warn!("stored catalog is corrupt, starting empty: {err}");
        Vec::new()
    })
}
