pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod models;
pub mod reconcile;
pub mod scheduler;
pub mod session;
pub mod utils;
pub mod view;

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use catalog::CatalogRepo;
use config::AppConfig;
use db::{BlobStore, Store};
use error::{HubError, Result};
use fetch::{EventFetcher, FeedDirFetcher};
use models::{EventRecord, Theme, TicketLead, User};
use scheduler::{Scheduler, SyncEngine, SyncOutcome};
use session::SessionRepo;
use view::{StatusCounts, ViewQuery};

pub use models::{CandidateEvent, EventStatus};
pub use reconcile::{reconcile, ReconcileOutcome, SyncSummary};

/// Everything the dashboard needs, wired over one blob store.
pub struct EventsHub {
    config: AppConfig,
    catalog: Arc<CatalogRepo>,
    session: SessionRepo,
    engine: Arc<SyncEngine>,
}

impl EventsHub {
    /// Opens the SQLite store at the configured path and reads feeds from the
    /// configured feed directory.
    pub fn open(config: AppConfig) -> Result<Self> {
        let store = Arc::new(Store::open(&config.database_path)?);
        let fetcher = Arc::new(FeedDirFetcher::new(config.feed_dir.clone()));
        Ok(Self::with_parts(config, store, fetcher))
    }

    pub fn with_parts(
        config: AppConfig,
        store: Arc<dyn BlobStore>,
        fetcher: Arc<dyn EventFetcher>,
    ) -> Self {
        let catalog = Arc::new(CatalogRepo::new(Arc::clone(&store)));
        let engine = Arc::new(SyncEngine::new(Arc::clone(&catalog), fetcher));
        Self {
            config,
            catalog,
            session: SessionRepo::new(store),
            engine,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn is_syncing(&self) -> bool {
        self.engine.is_syncing()
    }

    /// Maps a city name to its configured spelling; unknown cities are
    /// rejected so records are never stamped with a second spelling.
    pub fn resolve_city(&self, city: &str) -> Result<String> {
        self.config
            .canonical_city(city)
            .map(str::to_string)
            .ok_or_else(|| {
                HubError::Invalid(format!(
                    "unknown city {city:?}; known: {}",
                    self.config.cities.join(", ")
                ))
            })
    }

    pub async fn sync_city(&self, city: &str) -> Result<SyncOutcome> {
        let city = self.resolve_city(city)?;
        Ok(self.engine.run_sync(&city).await)
    }

    /// Starts periodic syncing of `city` at the configured interval.
    pub fn start_scheduler(&self, city: &str) -> Result<Scheduler> {
        let city = self.resolve_city(city)?;
        info!(
            city = %city,
            every_secs = self.config.sync_interval().as_secs(),
            "starting scheduler"
        );
        Ok(Scheduler::spawn(
            Arc::clone(&self.engine),
            city,
            self.config.sync_interval(),
        ))
    }

    pub fn events(&self) -> Result<Vec<EventRecord>> {
        self.catalog.load()
    }

    pub fn dashboard(&self, query: &ViewQuery) -> Result<Vec<EventRecord>> {
        let query = ViewQuery {
            city: self.resolve_city(&query.city)?,
            ..query.clone()
        };
        let catalog = self.catalog.load()?;
        Ok(view::dashboard_view(&catalog, &query, Utc::now())
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn counts(&self, city: &str) -> Result<StatusCounts> {
        let city = self.resolve_city(city)?;
        Ok(view::status_counts(&self.catalog.load()?, &city))
    }

    pub fn public_feed(&self, search: &str) -> Result<Vec<EventRecord>> {
        let catalog = self.catalog.load()?;
        Ok(view::public_feed(&catalog, search)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Curation requires a signed-in user; the import is attributed to them.
    pub fn import_event(&self, id: &str, notes: Option<String>) -> Result<EventRecord> {
        let user = self
            .session
            .current_user()?
            .ok_or_else(|| HubError::Invalid("sign in before importing events".into()))?;
        self.catalog.import_event(id, &user.email, notes, Utc::now())
    }

    pub fn remove_event(&self, id: &str) -> Result<EventRecord> {
        self.catalog.remove_event(id)
    }

    pub fn submit_ticket_lead(&self, event_id: &str, email: &str, consent: bool) -> Result<()> {
        let known = self.catalog.load()?.iter().any(|e| e.id == event_id);
        if !known {
            return Err(HubError::NotFound(event_id.to_string()));
        }
        self.session.record_ticket_lead(TicketLead {
            email: email.trim().to_string(),
            consent,
            event_id: event_id.to_string(),
            timestamp: Utc::now(),
        })
    }

    pub fn ticket_leads(&self) -> Result<Vec<TicketLead>> {
        self.session.ticket_leads()
    }

    pub fn login(&self, user: &User) -> Result<()> {
        self.session.login(user)
    }

    pub fn logout(&self) -> Result<()> {
        self.session.logout()
    }

    pub fn current_user(&self) -> Result<Option<User>> {
        self.session.current_user()
    }

    pub fn theme(&self) -> Result<Theme> {
        self.session.theme()
    }

    pub fn toggle_theme(&self) -> Result<Theme> {
        self.session.toggle_theme()
    }
}
