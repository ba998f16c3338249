//! Backend collaborators of the review client
//!
//! The view model talks to two stores: [`AnalysisStore`] for analysis
//! metadata and raw comparison payloads, [`VerificationStore`] for per-field
//! review state. [`crate::http::HttpBackend`] implements both over HTTP;
//! tests substitute in-memory doubles.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tzpc_common::api::{AnalysisRecord, FieldVerificationRecord, OverallReviewUpdate, SaveFieldRequest};
use tzpc_common::model::ComparisonMode;
use tzpc_common::Error;

use crate::upload::UploadFile;

/// Store call failures
///
/// Connectivity and 5xx failures are retryable; 4xx rejections and
/// `success: false` answers are not.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication required")]
    Unauthorized { login_url: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("{0}")]
    Application(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Error for reads: `load`, listing, polling
    pub fn into_read_error(self) -> Error {
        let retryable = self.is_retryable();
        match self {
            StoreError::Unauthorized { login_url } => Error::Unauthorized { login_url },
            StoreError::NotFound(what) => Error::NotFound(what),
            StoreError::Application(message) => Error::Application(message),
            StoreError::Decode(message) => Error::MalformedPayload(message),
            StoreError::Http { status, message } if retryable => {
                Error::Network(format!("HTTP {}: {}", status, message))
            }
            StoreError::Http { status, message } => {
                Error::Application(format!("HTTP {}: {}", status, message))
            }
            StoreError::Network(message) => Error::Network(message),
        }
    }

    /// Error for writes: the message is kept verbatim for the user
    pub fn into_save_error(self) -> Error {
        let retryable = self.is_retryable();
        match self {
            StoreError::Unauthorized { login_url } => Error::Unauthorized { login_url },
            StoreError::Http { message, .. } if !retryable => Error::SaveFailed { retryable, message },
            StoreError::Application(message) => Error::SaveFailed { retryable, message },
            other => Error::SaveFailed {
                retryable,
                message: other.to_string(),
            },
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Analysis metadata, comparison payloads and analysis-level review
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// One analysis including its raw `comparison_result`
    async fn get_analysis(&self, analysis_id: i64) -> StoreResult<AnalysisRecord>;

    /// All analyses visible to the session, in server order
    async fn list_analyses(&self) -> StoreResult<Vec<AnalysisRecord>>;

    /// Upload a TZ and a passport; returns the new id when the server reports it
    async fn create_analysis(
        &self,
        tz_file: UploadFile,
        passport_file: UploadFile,
        mode: ComparisonMode,
    ) -> StoreResult<Option<i64>>;

    /// Patch the overall comment / verification
    async fn update_overall_review(&self, analysis_id: i64, update: &OverallReviewUpdate) -> StoreResult<()>;
}

/// Per-field review records
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Stored records keyed by field key
    async fn get_field_verifications(&self, analysis_id: i64)
        -> StoreResult<HashMap<String, FieldVerificationRecord>>;

    /// Materialize default records for every field; returns how many were created
    async fn save_all_fields(&self, analysis_id: i64) -> StoreResult<u32>;

    /// Upsert one record; returns the stored record
    async fn save_field_verification(
        &self,
        analysis_id: i64,
        request: &SaveFieldRequest,
    ) -> StoreResult<FieldVerificationRecord>;
}
