use std::sync::LazyLock;

use regex::Regex;

/// Every accepted document starts with this header
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Organization ids end up in the callback host, so they must be a single
/// DNS label.
pub static ORGANIZATION_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?$")
        .expect("organization id pattern compiles")
});

pub fn is_valid_organization_id(id: &str) -> bool {
    ORGANIZATION_ID_PATTERN.is_match(id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates input size against the configured maximum
pub fn validate_file_size(size: usize, max_size: usize) -> Result<(), ValidationError> {
    if size > max_size {
        return Err(ValidationError {
            code: "FILE_TOO_LARGE",
            message: format!(
                "Input pdf length {} bytes exceeds maximum allowed {} bytes",
                size, max_size
            ),
        });
    }
    Ok(())
}

/// Checks the magic bytes of a PDF document
pub fn require_pdf_header(bytes: &[u8]) -> Result<(), ValidationError> {
    if bytes.len() < PDF_MAGIC.len() {
        return Err(ValidationError {
            code: "EMPTY_FILE",
            message: "Empty file".to_string(),
        });
    }

    if !bytes.starts_with(PDF_MAGIC) {
        return Err(ValidationError {
            code: "NOT_A_PDF",
            message: "Not a PDF (missing %PDF- header)".to_string(),
        });
    }

    Ok(())
}

/// Full validation for a document submitted for compression
pub fn validate_pdf_upload(bytes: &[u8], max_size: usize) -> Result<(), ValidationError> {
    require_pdf_header(bytes)?;
    validate_file_size(bytes.len(), max_size)?;
    Ok(())
}
