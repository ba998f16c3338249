//! Document uploads for new analyses
//!
//! Files are checked locally against the server's limits before anything is
//! sent, so an oversized or unsupported file fails fast with `InvalidInput`.

use std::path::Path;
use tzpc_common::{Error, Result};

/// Extensions the backend accepts
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "docx", "doc", "txt"];

/// Upload size limit per file
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// One validated document ready for multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Validate name and contents
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let file_name = file_name.into();

        let extension = Path::new(&file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(Error::InvalidInput(format!(
                "{}: unsupported file type, expected one of .{}",
                file_name,
                ALLOWED_EXTENSIONS.join(", .")
            )));
        }
        if bytes.is_empty() {
            return Err(Error::InvalidInput(format!("{}: file is empty", file_name)));
        }
        if bytes.len() > MAX_FILE_SIZE {
            return Err(Error::InvalidInput(format!(
                "{}: {} bytes exceeds the {} MiB limit",
                file_name,
                bytes.len(),
                MAX_FILE_SIZE / (1024 * 1024)
            )));
        }

        Ok(Self { file_name, bytes })
    }

    /// Read and validate a file from disk
    pub async fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidInput(format!("{}: not a file name", path.display())))?
            .to_string();

        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() > MAX_FILE_SIZE as u64 {
            return Err(Error::InvalidInput(format!(
                "{}: {} bytes exceeds the {} MiB limit",
                file_name,
                metadata.len(),
                MAX_FILE_SIZE / (1024 * 1024)
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        Self::new(file_name, bytes)
    }

    /// Content type sent with the multipart part
    pub fn mime_type(&self) -> &'static str {
        let lower = self.file_name.to_ascii_lowercase();
        if lower.ends_with(".pdf") {
            "application/pdf"
        } else if lower.ends_with(".docx") {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        } else if lower.ends_with(".doc") {
            "application/msword"
        } else {
            "text/plain"
        }
    }
}
