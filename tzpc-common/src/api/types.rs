//! Request/response shapes of the analysis backend
//!
//! Every response is wrapped in `{ success, error?, ... }`. FastAPI errors
//! use `{ detail }` instead, which is why both message fields are kept.

use crate::model::{
    AnalysisStatus, AnalysisSummary, ComparisonField, FieldSnapshot, FieldVerification,
    ManualVerification,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ========================================
// Envelope
// ========================================

/// `{ success, error?, ...body }`
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Envelope<T> {
    /// Body when `success` is true, else the server's message
    pub fn into_result(self) -> std::result::Result<T, String> {
        if self.success {
            Ok(self.body)
        } else {
            Err(self
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "request was not successful".to_string()))
        }
    }
}

/// Best human-readable message from an error body
///
/// Looks at `detail` (string or structured), then `error`, then `message`,
/// and falls back to the raw text.
pub fn error_message_from_body(body: &str) -> String {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) {
        for field in ["detail", "error", "message"] {
            match obj.get(field) {
                Some(Value::String(s)) if !s.is_empty() => return s.clone(),
                Some(Value::String(_)) | Some(Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }
    body.trim().to_string()
}

// ========================================
// Analyses
// ========================================

/// Body of `GET /api/analysis/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisBody {
    #[serde(default)]
    pub analysis: Option<AnalysisRecord>,
}

/// Analysis row as the server stores it
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub tz_filename: String,
    pub passport_filename: String,
    pub status: AnalysisStatus,
    /// Raw model output: object, JSON text, or null while processing
    #[serde(default)]
    pub comparison_result: Option<Value>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub manual_verification: Option<bool>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl AnalysisRecord {
    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            id: self.id,
            tz_filename: self.tz_filename.clone(),
            passport_filename: self.passport_filename.clone(),
            status: self.status,
            overall_comment: self.comment.clone(),
            overall_manual_verification: self.manual_verification.into(),
            processing_time: self.processing_time,
            error_message: self.error_message.clone(),
        }
    }
}

/// Body of `GET /api/analyses`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisListBody {
    #[serde(default)]
    pub analyses: Vec<AnalysisRecord>,
}

/// Body of `POST /api/analysis/create`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAnalysisBody {
    #[serde(default, alias = "id")]
    pub analysis_id: Option<i64>,
}

/// Analysis-level review sent as multipart by `PATCH /api/analysis/{id}`
///
/// Absent parts are left untouched by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverallReviewUpdate {
    pub comment: Option<String>,
    pub manual_verification: Option<bool>,
}

impl OverallReviewUpdate {
    pub fn new(comment: &str, verification: ManualVerification) -> Self {
        Self {
            comment: crate::model::normalize_comment(comment),
            manual_verification: verification.as_option(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.comment.is_none() && self.manual_verification.is_none()
    }
}

/// Body of responses that carry nothing but the envelope
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmptyBody {}

// ========================================
// Field verifications
// ========================================

/// Body of `GET /api/analysis/{id}/field-verifications`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldVerificationsBody {
    #[serde(default)]
    pub field_verifications: Option<Map<String, Value>>,
}

/// Stored per-field review
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FieldVerificationRecord {
    #[serde(default)]
    pub field_key: Option<String>,
    #[serde(default)]
    pub tz_value: Option<String>,
    #[serde(default)]
    pub passport_value: Option<String>,
    #[serde(default)]
    pub quote: Option<String>,
    #[serde(default)]
    pub auto_match: Option<bool>,
    #[serde(default)]
    pub manual_verification: Option<bool>,
    #[serde(default)]
    pub specialist_comment: Option<String>,
}

impl FieldVerificationRecord {
    /// Domain form under `key`; the map key wins over `field_key`
    pub fn into_verification(self, key: &str) -> FieldVerification {
        FieldVerification {
            key: key.to_string(),
            manual_verification: self.manual_verification.into(),
            specialist_comment: self.specialist_comment.filter(|c| !c.trim().is_empty()),
            snapshot: FieldSnapshot {
                tz_value: self.tz_value,
                passport_value: self.passport_value,
                quote: self.quote,
                auto_match: self.auto_match,
            },
        }
    }
}

/// Body of `POST /api/analysis/{id}/save-all-fields`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveAllFieldsBody {
    #[serde(default)]
    pub saved_count: u32,
}

/// Request of `POST /api/analysis/{id}/field-verification`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveFieldRequest {
    pub field_key: String,
    pub tz_value: Option<String>,
    pub passport_value: Option<String>,
    pub quote: Option<String>,
    pub auto_match: Option<bool>,
    pub manual_verification: Option<bool>,
    pub specialist_comment: Option<String>,
}

impl SaveFieldRequest {
    /// Self-contained request: the decision plus the field's auto-derived values
    pub fn new(field: &ComparisonField, decision: &FieldVerification) -> Self {
        let snapshot = FieldSnapshot::of(field);
        Self {
            field_key: field.key.clone(),
            tz_value: snapshot.tz_value,
            passport_value: snapshot.passport_value,
            quote: snapshot.quote,
            auto_match: snapshot.auto_match,
            manual_verification: decision.manual_verification.as_option(),
            specialist_comment: decision.specialist_comment.clone(),
        }
    }
}

/// Body of `POST /api/analysis/{id}/field-verification`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveFieldBody {
    #[serde(default)]
    pub field_verification: Option<FieldVerificationRecord>,
}
