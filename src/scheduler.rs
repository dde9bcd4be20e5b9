use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use serde::Serialize;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{error, info, warn};

use crate::catalog::CatalogRepo;
use crate::error::HubError;
use crate::fetch::{fetch_or_empty, EventFetcher};
use crate::reconcile::{ReconcileOutcome, SyncSummary};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Merged(SyncSummary),
    NoEvents,
    Busy,
    Failed { reason: String },
}

/// Runs reconciliation cycles. At most one cycle is in flight at a time.
pub struct SyncEngine {
    catalog: Arc<CatalogRepo>,
    fetcher: Arc<dyn EventFetcher>,
    syncing: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncEngine {
    pub fn new(catalog: Arc<CatalogRepo>, fetcher: Arc<dyn EventFetcher>) -> Self {
        Self {
            catalog,
            fetcher,
            syncing: AtomicBool::new(false),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    fn begin(&self) -> Option<InFlight<'_>> {
        self.syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.syncing))
    }

    pub async fn run_sync(&self, city: &str) -> SyncOutcome {
        let Some(_in_flight) = self.begin() else {
            info!(city = %city, "sync already in progress, skipping");
            return SyncOutcome::Busy;
        };
        info!(city = %city, "starting sync");

        let scraped = fetch_or_empty(self.fetcher.as_ref(), city).await;
        if scraped.is_empty() {
            warn!(city = %city, "no events found");
            return SyncOutcome::NoEvents;
        }

        let catalog = Arc::clone(&self.catalog);
        let target = city.to_string();
        let result = tokio::task::spawn_blocking(move || {
            catalog.apply_scrape(scraped, &target, Utc::now())
        })
        .await
        .map_err(HubError::from)
        .and_then(|applied| applied);

        match result {
            Ok(ReconcileOutcome::Merged { summary, .. }) => {
                info!(
                    city = %city,
                    created = summary.created,
                    updated = summary.updated,
                    inactivated = summary.inactivated,
                    rejected = summary.rejected,
                    "sync completed"
                );
                SyncOutcome::Merged(summary)
            }
            Ok(ReconcileOutcome::NoOp { rejected }) => {
                warn!(city = %city, rejected, "no admissible events found");
                SyncOutcome::NoEvents
            }
            Err(err) => {
                error!(city = %city, "sync failed: {err}");
                SyncOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }
}

/// Periodic sync loop. Owns the active city and hands it to every cycle.
pub struct Scheduler {
    city: watch::Sender<String>,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Starts the loop: one cycle right away, then one per `period`.
    pub fn spawn(engine: Arc<SyncEngine>, city: String, period: Duration) -> Self {
        let (city_tx, city_rx) = watch::channel(city);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(engine, city_rx, stop_rx, period));
        Self {
            city: city_tx,
            stop: stop_tx,
            handle,
        }
    }

    pub fn active_city(&self) -> String {
        self.city.borrow().clone()
    }

    /// Takes effect from the next tick.
    pub fn set_active_city(&self, city: impl Into<String>) {
        self.city.send_replace(city.into());
    }

    /// Stops the loop once the cycle in flight, if any, has finished.
    pub async fn shutdown(self) {
        self.stop.send_replace(true);
        if let Err(err) = self.handle.await {
            error!("scheduler task failed: {err}");
        }
    }
}

async fn run_loop(
    engine: Arc<SyncEngine>,
    city: watch::Receiver<String>,
    mut stop: watch::Receiver<bool>,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        let target = city.borrow().clone();
        let outcome = engine.run_sync(&target).await;
        info!(city = %target, ?outcome, "scheduled sync finished");
        if *stop.borrow() {
            break;
        }
    }
    info!("scheduler stopped");
}
