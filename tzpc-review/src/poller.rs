//! Polling the backend while comparisons run
//!
//! Analyses are processed asynchronously server-side; the client re-reads
//! them at a fixed interval until they reach a terminal status.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use tzpc_common::model::{AnalysisStatus, AnalysisSummary};
use tzpc_common::{Error, Result};

use crate::store::{AnalysisStore, StoreError};

/// Consecutive transient failures tolerated before giving up
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

pub struct AnalysisPoller {
    store: Arc<dyn AnalysisStore>,
    interval: Duration,
    timeout: Duration,
}

impl AnalysisPoller {
    pub fn new(store: Arc<dyn AnalysisStore>, interval: Duration, timeout: Duration) -> Self {
        Self {
            store,
            interval,
            timeout,
        }
    }

    /// Poll one analysis until it is completed or failed
    ///
    /// `on_status` is called with the first observation and after every
    /// status change.
    pub async fn wait_for_completion<F>(&self, analysis_id: i64, mut on_status: F) -> Result<AnalysisSummary>
    where
        F: FnMut(&AnalysisSummary),
    {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_status: Option<AnalysisStatus> = None;
        let mut failures = 0;

        loop {
            ticker.tick().await;

            match self.store.get_analysis(analysis_id).await {
                Ok(record) => {
                    failures = 0;
                    let summary = record.summary();
                    if last_status != Some(summary.status) {
                        debug!(analysis_id, status = ?summary.status, "Analysis status changed");
                        on_status(&summary);
                        last_status = Some(summary.status);
                    }
                    if summary.status.is_terminal() {
                        info!(analysis_id, status = ?summary.status, "Analysis finished");
                        return Ok(summary);
                    }
                }
                Err(e) => self.tolerate(e, &mut failures)?,
            }

            if started.elapsed() >= self.timeout {
                return Err(Error::Network(format!(
                    "analysis {} did not finish within {}s",
                    analysis_id,
                    self.timeout.as_secs()
                )));
            }
        }
    }

    /// Re-list analyses until none is pending or processing
    pub async fn watch_list<F>(&self, mut on_list: F) -> Result<Vec<AnalysisSummary>>
    where
        F: FnMut(&[AnalysisSummary]),
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0;

        loop {
            ticker.tick().await;

            match self.store.list_analyses().await {
                Ok(records) => {
                    failures = 0;
                    let summaries: Vec<AnalysisSummary> = records.iter().map(|r| r.summary()).collect();
                    on_list(&summaries);
                    if summaries.iter().all(|s| s.status.is_terminal()) {
                        return Ok(summaries);
                    }
                }
                Err(e) => self.tolerate(e, &mut failures)?,
            }
        }
    }

    /// Keep polling through a few transient failures; everything else ends it
    fn tolerate(&self, error: StoreError, failures: &mut u32) -> Result<()> {
        if !error.is_retryable() {
            return Err(error.into_read_error());
        }
        *failures += 1;
        warn!(error = %error, attempt = *failures, "Poll failed");
        if *failures >= MAX_CONSECUTIVE_FAILURES {
            return Err(error.into_read_error());
        }
        Ok(())
    }
}
