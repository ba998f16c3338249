//! HTTP implementation of the analysis and verification stores
//!
//! Status handling is uniform across endpoints:
//! - transport failure -> [`StoreError::Network`]
//! - 401 -> [`StoreError::Unauthorized`] with the login URL to redirect to
//! - 404 -> [`StoreError::NotFound`]
//! - other non-2xx -> [`StoreError::Http`] with the server's message
//! - 2xx with `success: false` -> [`StoreError::Application`]

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use tzpc_common::api::{
    error_message_from_body, AnalysisBody, AnalysisListBody, AnalysisRecord, CreateAnalysisBody,
    EmptyBody, Envelope, FieldVerificationRecord, FieldVerificationsBody, OverallReviewUpdate,
    SaveAllFieldsBody, SaveFieldBody, SaveFieldRequest,
};
use tzpc_common::model::ComparisonMode;
use tzpc_common::{ClientConfig, Error};

use crate::store::{AnalysisStore, StoreError, StoreResult, VerificationStore};
use crate::upload::UploadFile;

const USER_AGENT: &str = concat!("tzpc-review/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed client for the analysis backend
pub struct HttpBackend {
    http_client: reqwest::Client,
    config: ClientConfig,
}

impl HttpBackend {
    /// Fails only on configuration the client cannot be built from
    pub fn new(config: ClientConfig) -> tzpc_common::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &config.session_cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| Error::Config(format!("invalid session cookie: {}", e)))?;
            headers.insert(COOKIE, value);
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self { http_client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a request and unwrap the `{ success, error, ... }` envelope
    async fn send<T: DeserializeOwned>(&self, what: &str, request: RequestBuilder) -> StoreResult<T> {
        let response = request.send().await.map_err(|e| {
            warn!(request = %what, error = %e, "Request failed before a response arrived");
            StoreError::Network(e.to_string())
        })?;

        let status = response.status();
        debug!(request = %what, status = status.as_u16(), "Backend responded");

        if status == StatusCode::UNAUTHORIZED {
            return Err(StoreError::Unauthorized {
                login_url: self.config.login_url(),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let mut message = error_message_from_body(&body);
            if message.is_empty() {
                message = status.canonical_reason().unwrap_or("request failed").to_string();
            }
            if status == StatusCode::NOT_FOUND {
                return Err(StoreError::NotFound(format!("{}: {}", what, message)));
            }
            warn!(request = %what, status = status.as_u16(), message = %message, "Backend rejected request");
            return Err(StoreError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| StoreError::Decode(format!("{}: {}", what, e)))?;

        envelope.into_result().map_err(|message| {
            warn!(request = %what, message = %message, "Backend reported failure");
            StoreError::Application(message)
        })
    }
}

#[async_trait]
impl AnalysisStore for HttpBackend {
    async fn get_analysis(&self, analysis_id: i64) -> StoreResult<AnalysisRecord> {
        let url = self.config.url(&format!("/api/analysis/{}", analysis_id));
        let body: AnalysisBody = self
            .send(&format!("analysis {}", analysis_id), self.http_client.get(&url))
            .await?;

        body.analysis
            .ok_or_else(|| StoreError::Decode(format!("analysis {}: response has no analysis", analysis_id)))
    }

    async fn list_analyses(&self) -> StoreResult<Vec<AnalysisRecord>> {
        let url = self.config.url("/api/analyses");
        let body: AnalysisListBody = self.send("analysis list", self.http_client.get(&url)).await?;
        Ok(body.analyses)
    }

    async fn create_analysis(
        &self,
        tz_file: UploadFile,
        passport_file: UploadFile,
        mode: ComparisonMode,
    ) -> StoreResult<Option<i64>> {
        let url = self.config.url("/api/analysis/create");

        let form = Form::new()
            .part("tz_file", file_part(tz_file)?)
            .part("passport_file", file_part(passport_file)?)
            .text("comparison_mode", mode.as_str());

        let body: CreateAnalysisBody = self
            .send("create analysis", self.http_client.post(&url).multipart(form))
            .await?;

        info!(analysis_id = ?body.analysis_id, mode = mode.as_str(), "Analysis submitted");
        Ok(body.analysis_id)
    }

    async fn update_overall_review(&self, analysis_id: i64, update: &OverallReviewUpdate) -> StoreResult<()> {
        let url = self.config.url(&format!("/api/analysis/{}", analysis_id));

        let mut form = Form::new();
        if let Some(verification) = update.manual_verification {
            form = form.text("manual_verification", verification.to_string());
        }
        if let Some(comment) = &update.comment {
            form = form.text("comment", comment.clone());
        }

        let _: EmptyBody = self
            .send(
                &format!("overall review of {}", analysis_id),
                self.http_client.patch(&url).multipart(form),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VerificationStore for HttpBackend {
    async fn get_field_verifications(
        &self,
        analysis_id: i64,
    ) -> StoreResult<HashMap<String, FieldVerificationRecord>> {
        let url = self
            .config
            .url(&format!("/api/analysis/{}/field-verifications", analysis_id));
        let what = format!("field verifications of {}", analysis_id);
        let body: FieldVerificationsBody = self.send(&what, self.http_client.get(&url)).await?;

        let mut records = HashMap::new();
        for (key, value) in body.field_verifications.unwrap_or_default() {
            let record: FieldVerificationRecord = serde_json::from_value(value)
                .map_err(|e| StoreError::Decode(format!("{}: record '{}': {}", what, key, e)))?;
            records.insert(key, record);
        }

        debug!(analysis_id, count = records.len(), "Loaded field verifications");
        Ok(records)
    }

    async fn save_all_fields(&self, analysis_id: i64) -> StoreResult<u32> {
        let url = self
            .config
            .url(&format!("/api/analysis/{}/save-all-fields", analysis_id));
        let body: SaveAllFieldsBody = self
            .send(&format!("default verifications of {}", analysis_id), self.http_client.post(&url))
            .await?;

        info!(analysis_id, saved = body.saved_count, "Default field verifications stored");
        Ok(body.saved_count)
    }

    async fn save_field_verification(
        &self,
        analysis_id: i64,
        request: &SaveFieldRequest,
    ) -> StoreResult<FieldVerificationRecord> {
        let url = self
            .config
            .url(&format!("/api/analysis/{}/field-verification", analysis_id));
        let what = format!("verification of '{}'", request.field_key);
        let body: SaveFieldBody = self.send(&what, self.http_client.post(&url).json(request)).await?;

        body.field_verification
            .ok_or_else(|| StoreError::Decode(format!("{}: response has no stored record", what)))
    }
}

fn file_part(file: UploadFile) -> StoreResult<Part> {
    let mime = file.mime_type();
    Part::bytes(file.bytes)
        .file_name(file.file_name)
        .mime_str(mime)
        .map_err(|e| StoreError::Decode(format!("invalid content type {}: {}", mime, e)))
}
