//! Reconciliation of model output with human review
//!
//! [`ReconciliationViewModel`] owns one analysis: the decoded comparison
//! fields (read-only) and a review record per field (editable). Each row
//! keeps the last persisted record and a local draft; a row is dirty while
//! the two differ.
//!
//! State sits behind a mutex that is never held across a network call, so a
//! save suspends only its caller. Saves for different keys run concurrently;
//! a second save for a key that is already in flight is refused.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use tzpc_common::api::{FieldVerificationRecord, OverallReviewUpdate, SaveFieldRequest};
use tzpc_common::model::{
    normalize_comment, AnalysisStatus, AnalysisSummary, AutoStatus, ComparisonField,
    ComparisonResult, ComparisonVerdict, FieldSnapshot, FieldVerification, ManualVerification,
};
use tzpc_common::{decode_comparison, Error, PayloadShape, Result};

use crate::store::{AnalysisStore, StoreError, VerificationStore};

/// One field merged with its review state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRow {
    pub key: String,
    pub expected_value: Option<String>,
    pub actual_value: Option<String>,
    pub auto_status: AutoStatus,
    pub supporting_quote: String,
    pub manual_verification: ManualVerification,
    pub specialist_comment: Option<String>,
    /// Local edits not yet persisted
    pub dirty: bool,
    /// A save for this row is in flight
    pub saving: bool,
}

/// How review records for never-reviewed fields were obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultsOutcome {
    /// Nothing to review
    NotNeeded,
    /// Every field already had a stored record
    AlreadyStored,
    /// Defaults were materialized by the store during this load
    Persisted { created: u32 },
    /// Persisting defaults failed; rows without a stored record use
    /// in-memory defaults
    Ephemeral { reason: String },
}

/// What `load` found, for the caller to surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub analysis_id: i64,
    pub status: AnalysisStatus,
    pub fields: usize,
    /// Payload layout, `None` when the analysis has no result yet
    pub shape: Option<PayloadShape>,
    /// Rows backed by a stored record
    pub stored_rows: usize,
    /// Rows using a synthesized default
    pub default_rows: usize,
    /// Stored records whose key is not in the comparison result
    pub dropped_keys: Vec<String>,
    pub defaults: DefaultsOutcome,
}

struct RowState {
    field: ComparisonField,
    persisted: FieldVerification,
    draft: FieldVerification,
    saving: bool,
}

impl RowState {
    fn new(field: ComparisonField, persisted: FieldVerification) -> Self {
        Self {
            draft: persisted.clone(),
            persisted,
            field,
            saving: false,
        }
    }

    fn is_dirty(&self) -> bool {
        !self.draft.same_decision(&self.persisted)
    }

    fn view(&self) -> ReviewRow {
        ReviewRow {
            key: self.field.key.clone(),
            expected_value: self.field.expected_value.clone(),
            actual_value: self.field.actual_value.clone(),
            auto_status: self.field.auto_status,
            supporting_quote: self.field.supporting_quote.clone(),
            manual_verification: self.draft.manual_verification,
            specialist_comment: self.draft.specialist_comment.clone(),
            dirty: self.is_dirty(),
            saving: self.saving,
        }
    }
}

struct LoadedAnalysis {
    summary: AnalysisSummary,
    verdict: Option<ComparisonVerdict>,
    order: Vec<String>,
    rows: HashMap<String, RowState>,
    overall_saving: bool,
}

#[derive(Default)]
struct ReviewState {
    /// Bumped by every successful load; save completions compare against it
    generation: u64,
    loaded: Option<LoadedAnalysis>,
}

impl ReviewState {
    fn loaded_mut(&mut self) -> Result<&mut LoadedAnalysis> {
        self.loaded.as_mut().ok_or(Error::NotLoaded)
    }

    fn loaded(&self) -> Result<&LoadedAnalysis> {
        self.loaded.as_ref().ok_or(Error::NotLoaded)
    }

    fn row_mut(&mut self, key: &str) -> Result<&mut RowState> {
        self.loaded_mut()?
            .rows
            .get_mut(key)
            .ok_or_else(|| Error::UnknownField(key.to_string()))
    }
}

/// Merged, editable view of one analysis
pub struct ReconciliationViewModel {
    analyses: Arc<dyn AnalysisStore>,
    verifications: Arc<dyn VerificationStore>,
    state: Mutex<ReviewState>,
}

impl ReconciliationViewModel {
    pub fn new(analyses: Arc<dyn AnalysisStore>, verifications: Arc<dyn VerificationStore>) -> Self {
        Self {
            analyses,
            verifications,
            state: Mutex::new(ReviewState::default()),
        }
    }

    /// Use one backend for both stores
    pub fn with_backend<B>(backend: Arc<B>) -> Self
    where
        B: AnalysisStore + VerificationStore + 'static,
    {
        Self::new(backend.clone(), backend)
    }

    fn state(&self) -> MutexGuard<'_, ReviewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the analysis, decode its comparison and merge review records
    ///
    /// Replaces any previously loaded analysis. On error the previous state
    /// is kept untouched.
    pub async fn load(&self, analysis_id: i64) -> Result<LoadReport> {
        info!(analysis_id, "Loading analysis");

        let record = self
            .analyses
            .get_analysis(analysis_id)
            .await
            .map_err(StoreError::into_read_error)?;
        let summary = record.summary();

        let (comparison, shape) = match &record.comparison_result {
            Some(raw) if !raw.is_null() => {
                let decoded = decode_comparison(raw)?;
                (decoded.result, Some(decoded.shape))
            }
            _ if summary.status == AnalysisStatus::Completed => {
                return Err(Error::MalformedPayload(format!(
                    "analysis {} is completed but has no comparison result",
                    analysis_id
                )));
            }
            _ => {
                debug!(analysis_id, status = ?summary.status, "No comparison result yet");
                (ComparisonResult::default(), None)
            }
        };

        let (mut stored, defaults) = if comparison.fields.is_empty() {
            (HashMap::new(), DefaultsOutcome::NotNeeded)
        } else {
            let stored = self
                .verifications
                .get_field_verifications(analysis_id)
                .await
                .map_err(StoreError::into_read_error)?;

            let missing = comparison
                .fields
                .iter()
                .filter(|f| !stored.contains_key(&f.key))
                .count();
            if missing == 0 {
                (stored, DefaultsOutcome::AlreadyStored)
            } else {
                debug!(analysis_id, missing, "Fields without a stored review record");
                self.materialize_defaults(analysis_id, stored).await?
            }
        };

        let mut order = Vec::with_capacity(comparison.fields.len());
        let mut rows = HashMap::with_capacity(comparison.fields.len());
        let mut stored_rows = 0;
        let mut default_rows = 0;

        for field in comparison.fields {
            let persisted = match stored.remove(&field.key) {
                Some(record) => {
                    stored_rows += 1;
                    let verification = record.into_verification(&field.key);
                    if verification.snapshot != FieldSnapshot::of(&field) {
                        debug!(field = %field.key, "Stored snapshot differs from current comparison");
                    }
                    verification
                }
                None => {
                    default_rows += 1;
                    FieldVerification::synthesize(&field)
                }
            };
            order.push(field.key.clone());
            rows.insert(field.key.clone(), RowState::new(field, persisted));
        }

        let mut dropped_keys: Vec<String> = stored.into_keys().collect();
        dropped_keys.sort();
        if !dropped_keys.is_empty() {
            warn!(analysis_id, dropped = ?dropped_keys, "Ignoring review records for fields not in the comparison");
        }

        let report = LoadReport {
            analysis_id,
            status: summary.status,
            fields: order.len(),
            shape,
            stored_rows,
            default_rows,
            dropped_keys,
            defaults,
        };

        let mut state = self.state();
        state.generation += 1;
        state.loaded = Some(LoadedAnalysis {
            summary,
            verdict: comparison.verdict,
            order,
            rows,
            overall_saving: false,
        });
        drop(state);

        info!(
            analysis_id,
            fields = report.fields,
            stored = report.stored_rows,
            defaults = report.default_rows,
            "Analysis loaded"
        );
        Ok(report)
    }

    /// Best-effort `save-all-fields` followed by a re-fetch
    ///
    /// Only an authentication failure aborts the load; anything else keeps
    /// the records already fetched, leaves in-memory defaults for the rest
    /// and is reported.
    async fn materialize_defaults(
        &self,
        analysis_id: i64,
        fetched: HashMap<String, FieldVerificationRecord>,
    ) -> Result<(HashMap<String, FieldVerificationRecord>, DefaultsOutcome)> {
        let attempt = async {
            let created = self.verifications.save_all_fields(analysis_id).await?;
            let stored = self.verifications.get_field_verifications(analysis_id).await?;
            Ok::<_, StoreError>((stored, created))
        };

        match attempt.await {
            Ok((stored, created)) => Ok((stored, DefaultsOutcome::Persisted { created })),
            Err(StoreError::Unauthorized { login_url }) => Err(Error::Unauthorized { login_url }),
            Err(e) => {
                warn!(analysis_id, error = %e, "Could not persist default verifications, using in-memory defaults");
                Ok((fetched, DefaultsOutcome::Ephemeral { reason: e.to_string() }))
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state().loaded.is_some()
    }

    pub fn summary(&self) -> Result<AnalysisSummary> {
        Ok(self.state().loaded()?.summary.clone())
    }

    pub fn verdict(&self) -> Result<Option<ComparisonVerdict>> {
        Ok(self.state().loaded()?.verdict.clone())
    }

    /// Merged view of one field
    pub fn get_row(&self, key: &str) -> Result<ReviewRow> {
        let state = self.state();
        state
            .loaded()?
            .rows
            .get(key)
            .map(RowState::view)
            .ok_or_else(|| Error::UnknownField(key.to_string()))
    }

    /// All rows in comparison order
    pub fn rows(&self) -> Result<Vec<ReviewRow>> {
        let state = self.state();
        let loaded = state.loaded()?;
        Ok(loaded
            .order
            .iter()
            .filter_map(|key| loaded.rows.get(key))
            .map(RowState::view)
            .collect())
    }

    /// Keys with unsaved edits, in comparison order
    pub fn dirty_keys(&self) -> Result<Vec<String>> {
        let state = self.state();
        let loaded = state.loaded()?;
        Ok(loaded
            .order
            .iter()
            .filter(|key| loaded.rows.get(*key).is_some_and(RowState::is_dirty))
            .cloned()
            .collect())
    }

    /// Set the reviewer's decision locally
    pub fn set_manual_verification(&self, key: &str, value: ManualVerification) -> Result<ReviewRow> {
        let mut state = self.state();
        let row = state.row_mut(key)?;
        row.draft.manual_verification = value;
        Ok(row.view())
    }

    /// Set the decision from user text (`true`, `false`, empty, ...)
    pub fn set_manual_verification_input(&self, key: &str, input: &str) -> Result<ReviewRow> {
        let value: ManualVerification = input.parse()?;
        self.set_manual_verification(key, value)
    }

    /// Set the specialist comment locally; blank text clears it
    pub fn set_comment(&self, key: &str, text: &str) -> Result<ReviewRow> {
        let mut state = self.state();
        let row = state.row_mut(key)?;
        row.draft.specialist_comment = normalize_comment(text);
        Ok(row.view())
    }

    /// Persist one row
    ///
    /// On success the stored echo becomes the persisted state; the draft
    /// follows it unless it was edited again while the save was in flight.
    /// On failure nothing changes except the in-flight flag. If the analysis
    /// was reloaded meanwhile, a successful echo is applied to the reloaded
    /// row so it does not show the pre-save state.
    pub async fn save_row(&self, key: &str) -> Result<ReviewRow> {
        let (analysis_id, request, sent, field, guard) = {
            let mut state = self.state();
            let generation = state.generation;
            let loaded = state.loaded_mut()?;
            let analysis_id = loaded.summary.id;
            let row = loaded
                .rows
                .get_mut(key)
                .ok_or_else(|| Error::UnknownField(key.to_string()))?;
            if row.saving {
                return Err(Error::SaveInFlight(key.to_string()));
            }
            row.saving = true;
            let request = SaveFieldRequest::new(&row.field, &row.draft);
            let guard = SavingGuard::new(self, generation, SaveTarget::Row(key.to_string()));
            (analysis_id, request, row.draft.clone(), row.field.clone(), guard)
        };

        debug!(analysis_id, field = %key, verification = ?request.manual_verification, "Saving field verification");
        let outcome = self
            .verifications
            .save_field_verification(analysis_id, &request)
            .await;

        let mut state = self.state();
        let current = guard.finish(&mut state);

        let echo = match outcome {
            Ok(record) => record.into_verification(key),
            Err(e) => {
                warn!(analysis_id, field = %key, error = %e, retryable = e.is_retryable(), "Field verification not saved");
                return Err(e.into_save_error());
            }
        };
        info!(analysis_id, field = %key, "Field verification saved");

        if !current {
            debug!(analysis_id, field = %key, "Analysis reloaded during save, applying echo to the reloaded row");
            return Ok(adopt_after_reload(&mut state, analysis_id, field, echo));
        }

        let row = state.row_mut(key)?;
        if row.draft.same_decision(&sent) {
            row.draft = echo.clone();
        } else {
            debug!(field = %key, "Keeping edit made during save");
        }
        row.persisted = echo;
        Ok(row.view())
    }

    /// Persist the analysis-level comment and decision
    ///
    /// Blank comment and `Unset` are not sent, leaving the stored values as
    /// they are.
    pub async fn save_overall_comment(
        &self,
        comment: &str,
        verification: ManualVerification,
    ) -> Result<AnalysisSummary> {
        let update = OverallReviewUpdate::new(comment, verification);

        let (analysis_id, guard) = {
            let mut state = self.state();
            let generation = state.generation;
            let loaded = state.loaded_mut()?;
            if loaded.overall_saving {
                return Err(Error::SaveInFlight("overall review".to_string()));
            }
            loaded.overall_saving = true;
            (loaded.summary.id, SavingGuard::new(self, generation, SaveTarget::Overall))
        };

        let outcome = self
            .analyses
            .update_overall_review(analysis_id, &update)
            .await;

        let mut state = self.state();
        let current = guard.finish(&mut state);

        if let Err(e) = outcome {
            warn!(analysis_id, error = %e, "Overall review not saved");
            return Err(e.into_save_error());
        }
        info!(analysis_id, "Overall review saved");

        let loaded = state.loaded_mut()?;
        if !current && (loaded.summary.id != analysis_id || loaded.overall_saving) {
            debug!(analysis_id, "Analysis changed during overall save, summary left as reloaded");
            return Ok(loaded.summary.clone());
        }
        if let Some(comment) = update.comment {
            loaded.summary.overall_comment = Some(comment);
        }
        if let Some(value) = update.manual_verification {
            loaded.summary.overall_manual_verification = Some(value).into();
        }
        Ok(loaded.summary.clone())
    }
}

/// Apply the echo of a save that straddled a reload
///
/// The reloaded row may predate the write. Its draft follows the echo only
/// if it has not been edited since the reload; a row with its own save in
/// flight is left to that save.
fn adopt_after_reload(
    state: &mut ReviewState,
    analysis_id: i64,
    field: ComparisonField,
    echo: FieldVerification,
) -> ReviewRow {
    let row = state
        .loaded
        .as_mut()
        .filter(|loaded| loaded.summary.id == analysis_id)
        .and_then(|loaded| loaded.rows.get_mut(&field.key));

    match row {
        Some(row) if !row.saving => {
            if row.draft.same_decision(&row.persisted) {
                row.draft = echo.clone();
            }
            row.persisted = echo;
            row.view()
        }
        Some(row) => row.view(),
        None => RowState::new(field, echo).view(),
    }
}

enum SaveTarget {
    Row(String),
    Overall,
}

/// Clears the in-flight flag when a save ends, including when the save
/// future is dropped mid-request
struct SavingGuard<'a> {
    view_model: &'a ReconciliationViewModel,
    generation: u64,
    target: SaveTarget,
    armed: bool,
}

impl<'a> SavingGuard<'a> {
    fn new(view_model: &'a ReconciliationViewModel, generation: u64, target: SaveTarget) -> Self {
        Self {
            view_model,
            generation,
            target,
            armed: true,
        }
    }

    /// Clear the flag under an already held lock; false if the state was
    /// reloaded since the save started
    fn finish(mut self, state: &mut ReviewState) -> bool {
        self.armed = false;
        self.clear(state)
    }

    fn clear(&self, state: &mut ReviewState) -> bool {
        if state.generation != self.generation {
            return false;
        }
        let Some(loaded) = state.loaded.as_mut() else {
            return false;
        };
        match &self.target {
            SaveTarget::Row(key) => {
                if let Some(row) = loaded.rows.get_mut(key) {
                    row.saving = false;
                }
            }
            SaveTarget::Overall => loaded.overall_saving = false,
        }
        true
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.view_model.state();
            self.clear(&mut state);
        }
    }
}
