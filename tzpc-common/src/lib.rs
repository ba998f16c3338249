//! # TZPC Common Library
//!
//! Network-free code shared by the review client:
//! - Domain model (comparison fields, review decisions, analysis summaries)
//! - API request/response types
//! - Tolerant decoding of the stored model output
//! - Configuration loading
//! - Error taxonomy

pub mod api;
pub mod config;
pub mod decode;
pub mod error;
pub mod model;

pub use config::{ClientConfig, ConfigOverrides};
pub use decode::{decode_comparison, DecodedComparison, PayloadShape};
pub use error::{Error, Result};
