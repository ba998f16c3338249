//! Wire types of the analysis backend's HTTP API
//!
//! Pure data: no HTTP client lives here, so the types can be shared by the
//! client and by test doubles of the server.

pub mod types;

pub use types::{
    error_message_from_body, AnalysisBody, AnalysisListBody, AnalysisRecord, CreateAnalysisBody,
    EmptyBody, Envelope, FieldVerificationRecord, FieldVerificationsBody, OverallReviewUpdate,
    SaveAllFieldsBody, SaveFieldBody, SaveFieldRequest,
};
