//! tzpc-review: review client for TZ / passport comparisons
//!
//! Loads an analysis from the backend, decodes the model's comparison output
//! and merges it with the reviewer's stored per-field decisions
//! ([`ReconciliationViewModel`]). Edits are kept locally until saved row by
//! row.

pub mod http;
pub mod poller;
pub mod render;
pub mod store;
pub mod upload;
pub mod view_model;

pub use http::HttpBackend;
pub use poller::AnalysisPoller;
pub use store::{AnalysisStore, StoreError, StoreResult, VerificationStore};
pub use upload::UploadFile;
pub use view_model::{DefaultsOutcome, LoadReport, ReconciliationViewModel, ReviewRow};
