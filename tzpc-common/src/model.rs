//! Domain model shared by the review client and its renderer
//!
//! Wire shapes live in [`crate::api::types`]; the types here are the
//! canonical, decoded form (`expected_value` / `actual_value` / `auto_status`).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Automated classification of one compared characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoStatus {
    Matched,
    Mismatched,
    Missing,
}

impl AutoStatus {
    /// Boolean form persisted as `auto_match`
    pub fn is_match(self) -> bool {
        matches!(self, AutoStatus::Matched)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AutoStatus::Matched => "matched",
            AutoStatus::Mismatched => "mismatched",
            AutoStatus::Missing => "missing",
        }
    }
}

impl fmt::Display for AutoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reviewer's tri-state decision
///
/// Travels on the wire as `true` / `false` / `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum ManualVerification {
    Agree,
    Disagree,
    #[default]
    Unset,
}

impl ManualVerification {
    pub fn as_option(self) -> Option<bool> {
        match self {
            ManualVerification::Agree => Some(true),
            ManualVerification::Disagree => Some(false),
            ManualVerification::Unset => None,
        }
    }

    pub fn is_set(self) -> bool {
        !matches!(self, ManualVerification::Unset)
    }
}

impl From<Option<bool>> for ManualVerification {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => ManualVerification::Agree,
            Some(false) => ManualVerification::Disagree,
            None => ManualVerification::Unset,
        }
    }
}

impl From<ManualVerification> for Option<bool> {
    fn from(value: ManualVerification) -> Self {
        value.as_option()
    }
}

impl FromStr for ManualVerification {
    type Err = Error;

    /// Accepts the radio-button values (`true`, `false`, empty) and their
    /// spelled-out aliases
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "agree" | "yes" | "ok" => Ok(ManualVerification::Agree),
            "false" | "disagree" | "no" => Ok(ManualVerification::Disagree),
            "" | "unset" | "none" | "null" => Ok(ManualVerification::Unset),
            other => Err(Error::InvalidInput(format!(
                "manual verification must be true, false or unset, got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ManualVerification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ManualVerification::Agree => "true",
            ManualVerification::Disagree => "false",
            ManualVerification::Unset => "unset",
        })
    }
}

/// Server-side processing state of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    #[serde(alias = "PENDING")]
    Pending,
    #[serde(alias = "PROCESSING")]
    Processing,
    #[serde(alias = "COMPLETED")]
    Completed,
    #[serde(alias = "FAILED")]
    Failed,
}

impl AnalysisStatus {
    /// Completed or failed; polling stops here
    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }
}

/// How strictly the server matches characteristic names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    #[default]
    Flexible,
    Strict,
}

impl ComparisonMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonMode::Flexible => "flexible",
            ComparisonMode::Strict => "strict",
        }
    }
}

impl FromStr for ComparisonMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flexible" => Ok(ComparisonMode::Flexible),
            "strict" => Ok(ComparisonMode::Strict),
            other => Err(Error::InvalidInput(format!(
                "comparison mode must be flexible or strict, got '{}'",
                other
            ))),
        }
    }
}

/// One characteristic compared between the TZ and the passport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonField {
    /// Characteristic name, unique within one result
    pub key: String,
    /// Value from the requirement document
    pub expected_value: Option<String>,
    /// Value from the product passport
    pub actual_value: Option<String>,
    /// Classification produced by the model
    pub auto_status: AutoStatus,
    /// Model's justification (may be empty)
    pub supporting_quote: String,
}

/// Auto-derived values stored alongside a review decision so the stored
/// record stays meaningful without the comparison payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldSnapshot {
    pub tz_value: Option<String>,
    pub passport_value: Option<String>,
    pub quote: Option<String>,
    pub auto_match: Option<bool>,
}

impl FieldSnapshot {
    pub fn of(field: &ComparisonField) -> Self {
        Self {
            tz_value: field.expected_value.clone(),
            passport_value: field.actual_value.clone(),
            quote: Some(field.supporting_quote.clone()).filter(|q| !q.is_empty()),
            auto_match: Some(field.auto_status.is_match()),
        }
    }
}

/// Human review layered on a [`ComparisonField`] with the same key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldVerification {
    pub key: String,
    pub manual_verification: ManualVerification,
    pub specialist_comment: Option<String>,
    pub snapshot: FieldSnapshot,
}

impl FieldVerification {
    /// Default record for a field that has never been reviewed
    pub fn synthesize(field: &ComparisonField) -> Self {
        Self {
            key: field.key.clone(),
            manual_verification: ManualVerification::Unset,
            specialist_comment: None,
            snapshot: FieldSnapshot::of(field),
        }
    }

    /// Same reviewer decision, ignoring the snapshot
    pub fn same_decision(&self, other: &FieldVerification) -> bool {
        self.manual_verification == other.manual_verification
            && self.specialist_comment == other.specialist_comment
    }
}

/// Trimmed comment, `None` when blank
pub fn normalize_comment(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Overall record of one analysis
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSummary {
    pub id: i64,
    pub tz_filename: String,
    pub passport_filename: String,
    pub status: AnalysisStatus,
    pub overall_comment: Option<String>,
    pub overall_manual_verification: ManualVerification,
    /// Seconds spent in the comparison pipeline
    pub processing_time: Option<f64>,
    pub error_message: Option<String>,
}

/// Model's overall verdict, when the payload carries one
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComparisonVerdict {
    pub matched: bool,
    pub criteria_success: Vec<String>,
    pub criteria_error: Vec<String>,
}

/// Decoded comparison output for one analysis
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComparisonResult {
    /// Fields in the order the model listed them
    pub fields: Vec<ComparisonField>,
    pub verdict: Option<ComparisonVerdict>,
}

impl ComparisonResult {
    pub fn field(&self, key: &str) -> Option<&ComparisonField> {
        self.fields.iter().find(|f| f.key == key)
    }
}
