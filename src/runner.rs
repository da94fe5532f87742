//! One poll → filter → deliver → record → cleanup cycle.

use crate::dedup::DedupStore;
use crate::delivery::DeliveryPipeline;
use crate::model::{CandidateItem, Strategy};
use crate::site::{ListingError, NewsSource};
use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("listing unavailable: {0}")]
    Listing(#[from] ListingError),
}

/// Randomized pause window between consecutive articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self { min, max }
    }

    pub fn bounds(&self) -> (Duration, Duration) {
        (self.min, self.max)
    }

    pub fn next_delay(&self) -> Duration {
        let lo = self.min.as_millis() as u64;
        let hi = self.max.as_millis() as u64;
        if lo == hi {
            return self.min;
        }
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }

    /// Sleep for a fresh random delay and report how long it was.
    pub async fn pause(&self) -> Duration {
        let delay = self.next_delay();
        tokio::time::sleep(delay).await;
        delay
    }
}

/// What happened during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub candidates: usize,
    pub fresh: usize,
    pub delivered: Vec<(String, Strategy)>,
    /// Every strategy failed; left unrecorded for the next run.
    pub failed: Vec<String>,
    /// Article could not be fetched or parsed.
    pub skipped: Vec<String>,
    pub evicted: u64,
    pub pauses: Vec<Duration>,
}

pub struct RunController {
    source: Arc<dyn NewsSource>,
    pipeline: DeliveryPipeline,
    store: DedupStore,
    pacing: Pacing,
    retention: chrono::Duration,
}

impl RunController {
    pub fn new(
        source: Arc<dyn NewsSource>,
        pipeline: DeliveryPipeline,
        store: DedupStore,
        pacing: Pacing,
        retention: chrono::Duration,
    ) -> Self {
        Self {
            source,
            pipeline,
            store,
            pacing,
            retention,
        }
    }

    /// Execute one run. Cleanup happens whether or not the listing could be
    /// fetched; only a listing failure is reported as an error.
    pub async fn run_once(&self) -> Result<RunSummary, RunError> {
        let run_id = Uuid::new_v4();
        async {
            let mut summary = RunSummary::default();
            let result = self.process(&mut summary).await;
            summary.evicted = self.cleanup().await;
            match result {
                Ok(()) => {
                    info!(
                        candidates = summary.candidates,
                        fresh = summary.fresh,
                        delivered = summary.delivered.len(),
                        failed = summary.failed.len(),
                        skipped = summary.skipped.len(),
                        evicted = summary.evicted,
                        "run finished"
                    );
                    Ok(summary)
                }
                Err(err) => {
                    error!(%err, evicted = summary.evicted, "run aborted");
                    Err(err)
                }
            }
        }
        .instrument(info_span!("run", %run_id))
        .await
    }

    async fn process(&self, summary: &mut RunSummary) -> Result<(), RunError> {
        let candidates = self.source.fetch_listing().await?;
        summary.candidates = candidates.len();

        let fresh = self.filter_new(candidates).await;
        summary.fresh = fresh.len();
        if fresh.is_empty() {
            info!("no new articles");
            return Ok(());
        }
        info!(count = fresh.len(), "new articles to deliver");

        for (idx, item) in fresh.iter().enumerate() {
            if idx > 0 {
                let pause = self.pacing.pause().await;
                summary.pauses.push(pause);
            }
            self.process_item(item, summary).await;
        }
        Ok(())
    }

    /// Unknown candidates in discovery order, each id at most once.
    pub async fn filter_new(&self, candidates: Vec<CandidateItem>) -> Vec<CandidateItem> {
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        for item in candidates {
            if !seen.insert(item.id.clone()) {
                continue;
            }
            if self.store.is_known(&item.id).await {
                continue;
            }
            info!(id = %item.id, title = %item.title, "queued");
            fresh.push(item);
        }
        fresh
    }

    #[instrument(skip_all, fields(id = %item.id))]
    async fn process_item(&self, item: &CandidateItem, summary: &mut RunSummary) {
        let content = match self.source.fetch_article(item).await {
            Ok(content) => content,
            Err(err) => {
                warn!(%err, title = %item.title, "skipping article");
                summary.skipped.push(item.id.clone());
                return;
            }
        };

        let report = self.pipeline.deliver(&item.id, &content).await;
        match report.delivered_by() {
            Some(strategy) => {
                self.store.record(&item.id, Utc::now()).await;
                summary.delivered.push((item.id.clone(), strategy));
            }
            None => {
                error!(
                    title = %content.title,
                    attempts = report.attempts.len(),
                    "all delivery strategies failed; will retry next run"
                );
                summary.failed.push(item.id.clone());
            }
        }
    }

    async fn cleanup(&self) -> u64 {
        match self.store.evict_older_than(Utc::now(), self.retention).await {
            Ok(removed) => removed,
            Err(err) => {
                error!(?err, "retention sweep failed");
                0
            }
        }
    }
}
