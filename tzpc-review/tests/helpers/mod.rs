//! Test helpers for tzpc-review
//!
//! [`MemoryBackend`] stands in for the HTTP backend: analyses and review
//! records live in memory, failures can be injected per operation and saves
//! for a given key can be held open to exercise concurrency.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tzpc_common::api::{AnalysisRecord, FieldVerificationRecord, OverallReviewUpdate, SaveFieldRequest};
use tzpc_common::decode_comparison;
use tzpc_common::model::{AnalysisStatus, ComparisonMode};
use tzpc_review::{AnalysisStore, StoreError, StoreResult, UploadFile, VerificationStore};

/// Analysis row with the given comparison payload
pub fn analysis(id: i64, status: AnalysisStatus, comparison_result: Option<Value>) -> AnalysisRecord {
    AnalysisRecord {
        id,
        tz_filename: "tz.pdf".to_string(),
        passport_filename: "passport.pdf".to_string(),
        status,
        comparison_result,
        comment: None,
        manual_verification: None,
        processing_time: Some(12.5),
        error_message: None,
    }
}

pub fn completed(id: i64, comparison_result: Value) -> AnalysisRecord {
    analysis(id, AnalysisStatus::Completed, Some(comparison_result))
}

/// Direct payload with three characteristics
pub fn sample_payload() -> Value {
    json!({
        "matched": false,
        "details": {
            "voltage": {"status": "mismatched", "expected": "220V", "actual": "230V", "message": "Напряжение 230 В"},
            "weight": {"status": "matched", "expected": "12 kg", "actual": "12 kg"},
            "ip_rating": {"status": "missing", "expected": "IP54", "actual": null}
        },
        "criteria_success": ["weight"],
        "criteria_error": ["voltage", "ip_rating"]
    })
}

/// Held save for one key
pub struct SaveGate {
    entered: Arc<Semaphore>,
    release: Arc<Semaphore>,
}

impl SaveGate {
    /// Resolves once the held save has reached the backend
    pub async fn entered(&self) {
        self.entered.acquire().await.unwrap().forget();
    }

    /// Let the held save complete
    pub fn release(&self) {
        self.release.add_permits(1);
    }
}

#[derive(Default)]
struct Inner {
    analyses: HashMap<i64, AnalysisRecord>,
    verifications: HashMap<i64, HashMap<String, FieldVerificationRecord>>,
    get_verifications_error: Option<StoreError>,
    save_all_error: Option<StoreError>,
    save_field_errors: Vec<StoreError>,
    overall_error: Option<StoreError>,
    gates: HashMap<String, (Arc<Semaphore>, Arc<Semaphore>)>,
    save_all_calls: u32,
    save_field_requests: Vec<SaveFieldRequest>,
    overall_updates: Vec<(i64, OverallReviewUpdate)>,
    created: Vec<(String, String, ComparisonMode)>,
}

#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_analysis(record: AnalysisRecord) -> Arc<Self> {
        let backend = Self::new();
        backend.insert_analysis(record);
        backend
    }

    pub fn insert_analysis(&self, record: AnalysisRecord) {
        self.inner.lock().unwrap().analyses.insert(record.id, record);
    }

    pub fn insert_verification(&self, analysis_id: i64, key: &str, record: FieldVerificationRecord) {
        self.inner
            .lock()
            .unwrap()
            .verifications
            .entry(analysis_id)
            .or_default()
            .insert(key.to_string(), record);
    }

    pub fn stored(&self, analysis_id: i64, key: &str) -> Option<FieldVerificationRecord> {
        self.inner
            .lock()
            .unwrap()
            .verifications
            .get(&analysis_id)
            .and_then(|m| m.get(key))
            .cloned()
    }

    pub fn stored_count(&self, analysis_id: i64) -> usize {
        self.inner
            .lock()
            .unwrap()
            .verifications
            .get(&analysis_id)
            .map_or(0, HashMap::len)
    }

    pub fn analysis(&self, analysis_id: i64) -> Option<AnalysisRecord> {
        self.inner.lock().unwrap().analyses.get(&analysis_id).cloned()
    }

    pub fn fail_get_verifications(&self, error: StoreError) {
        self.inner.lock().unwrap().get_verifications_error = Some(error);
    }

    pub fn fail_save_all(&self, error: StoreError) {
        self.inner.lock().unwrap().save_all_error = Some(error);
    }

    /// Fail the next field save
    pub fn fail_next_save(&self, error: StoreError) {
        self.inner.lock().unwrap().save_field_errors.push(error);
    }

    pub fn fail_overall(&self, error: StoreError) {
        self.inner.lock().unwrap().overall_error = Some(error);
    }

    /// Hold saves of `key` until the returned gate is released
    pub fn hold_saves(&self, key: &str) -> SaveGate {
        let entered = Arc::new(Semaphore::new(0));
        let release = Arc::new(Semaphore::new(0));
        self.inner
            .lock()
            .unwrap()
            .gates
            .insert(key.to_string(), (entered.clone(), release.clone()));
        SaveGate { entered, release }
    }

    pub fn save_all_calls(&self) -> u32 {
        self.inner.lock().unwrap().save_all_calls
    }

    pub fn save_field_requests(&self) -> Vec<SaveFieldRequest> {
        self.inner.lock().unwrap().save_field_requests.clone()
    }

    pub fn overall_updates(&self) -> Vec<(i64, OverallReviewUpdate)> {
        self.inner.lock().unwrap().overall_updates.clone()
    }
}

#[async_trait]
impl AnalysisStore for MemoryBackend {
    async fn get_analysis(&self, analysis_id: i64) -> StoreResult<AnalysisRecord> {
        self.analysis(analysis_id)
            .ok_or_else(|| StoreError::NotFound(format!("analysis {}", analysis_id)))
    }

    async fn list_analyses(&self) -> StoreResult<Vec<AnalysisRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut records: Vec<AnalysisRecord> = inner.analyses.values().cloned().collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.id));
        Ok(records)
    }

    async fn create_analysis(
        &self,
        tz_file: UploadFile,
        passport_file: UploadFile,
        mode: ComparisonMode,
    ) -> StoreResult<Option<i64>> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.analyses.keys().max().copied().unwrap_or(0) + 1;
        let mut record = analysis(id, AnalysisStatus::Pending, None);
        record.tz_filename = tz_file.file_name.clone();
        record.passport_filename = passport_file.file_name.clone();
        inner.analyses.insert(id, record);
        inner.created.push((tz_file.file_name, passport_file.file_name, mode));
        Ok(Some(id))
    }

    async fn update_overall_review(&self, analysis_id: i64, update: &OverallReviewUpdate) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.overall_error.clone() {
            return Err(error);
        }
        let record = inner
            .analyses
            .get_mut(&analysis_id)
            .ok_or_else(|| StoreError::NotFound(format!("analysis {}", analysis_id)))?;
        if let Some(comment) = &update.comment {
            record.comment = Some(comment.clone());
        }
        if let Some(value) = update.manual_verification {
            record.manual_verification = Some(value);
        }
        inner.overall_updates.push((analysis_id, update.clone()));
        Ok(())
    }
}

#[async_trait]
impl VerificationStore for MemoryBackend {
    async fn get_field_verifications(
        &self,
        analysis_id: i64,
    ) -> StoreResult<HashMap<String, FieldVerificationRecord>> {
        let inner = self.inner.lock().unwrap();
        if let Some(error) = inner.get_verifications_error.clone() {
            return Err(error);
        }
        Ok(inner.verifications.get(&analysis_id).cloned().unwrap_or_default())
    }

    /// Creates a default record for every field without one
    async fn save_all_fields(&self, analysis_id: i64) -> StoreResult<u32> {
        let mut inner = self.inner.lock().unwrap();
        inner.save_all_calls += 1;
        if let Some(error) = inner.save_all_error.clone() {
            return Err(error);
        }

        let raw = inner
            .analyses
            .get(&analysis_id)
            .and_then(|a| a.comparison_result.clone())
            .ok_or_else(|| StoreError::NotFound(format!("analysis {}", analysis_id)))?;
        let decoded = decode_comparison(&raw).map_err(|e| StoreError::Http {
            status: 400,
            message: e.to_string(),
        })?;

        let stored = inner.verifications.entry(analysis_id).or_default();
        let mut created = 0;
        for field in decoded.result.fields {
            if stored.contains_key(&field.key) {
                continue;
            }
            stored.insert(
                field.key.clone(),
                FieldVerificationRecord {
                    field_key: Some(field.key.clone()),
                    tz_value: field.expected_value.clone(),
                    passport_value: field.actual_value.clone(),
                    quote: Some(field.supporting_quote.clone()).filter(|q| !q.is_empty()),
                    auto_match: Some(field.auto_status.is_match()),
                    manual_verification: None,
                    specialist_comment: None,
                },
            );
            created += 1;
        }
        Ok(created)
    }

    async fn save_field_verification(
        &self,
        analysis_id: i64,
        request: &SaveFieldRequest,
    ) -> StoreResult<FieldVerificationRecord> {
        let gate = self.inner.lock().unwrap().gates.get(&request.field_key).cloned();
        if let Some((entered, release)) = gate {
            entered.add_permits(1);
            release.acquire().await.unwrap().forget();
        }

        let mut inner = self.inner.lock().unwrap();
        inner.save_field_requests.push(request.clone());
        if !inner.save_field_errors.is_empty() {
            return Err(inner.save_field_errors.remove(0));
        }

        let record = FieldVerificationRecord {
            field_key: Some(request.field_key.clone()),
            tz_value: request.tz_value.clone(),
            passport_value: request.passport_value.clone(),
            quote: request.quote.clone(),
            auto_match: request.auto_match,
            manual_verification: request.manual_verification,
            specialist_comment: request.specialist_comment.clone(),
        };
        inner
            .verifications
            .entry(analysis_id)
            .or_default()
            .insert(request.field_key.clone(), record.clone());
        Ok(record)
    }
}
