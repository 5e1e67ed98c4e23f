//! Upload validation: size limits, content-type sniffing, and filename
//! sanitization.
//!
//! The accept/reject decision is made from the byte signature alone; the
//! client-declared content type is only ever logged. Two declared-name
//! exceptions exist for mail formats that signature sniffing cannot settle:
//! `.eml` (accepted even when sniffing fails) and `.msg` (an OLE2 compound
//! file indistinguishable from legacy Office documents by signature).

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Bytes examined by the plain-text heuristic.
const TEXT_SNIFF_LEN: usize = 8192;

/// Resolved content types accepted into the pipeline.
const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/tiff",
    "image/bmp",
    "application/zip",
    "application/gzip",
    "application/x-ole-storage",
    "application/vnd.ms-outlook",
    "message/rfc822",
    "text/plain",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File size {size} exceeds maximum allowed size of {} MB", .max / 1024 / 1024)]
    FileTooLarge { size: usize, max: usize },

    #[error("Unsupported file type: {detected}")]
    UnsupportedType { detected: String },
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::FileTooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            ValidationError::UnsupportedType { .. } => {
                AppError::UnsupportedMediaType(err.to_string())
            }
        }
    }
}

/// Content type resolved from a byte signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedType {
    pub mime: &'static str,
    pub extension: &'static str,
}

const fn detected(mime: &'static str, extension: &'static str) -> DetectedType {
    DetectedType { mime, extension }
}

/// A validated upload, ready to be written to storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatedUpload {
    pub sanitized_filename: String,
    pub content_type: String,
    pub extension: String,
}

/// Sniff the true content type from the byte signature.
///
/// Returns `None` when no known signature matches and the plain-text
/// heuristic fails. OLE2 compound files (legacy Office, Outlook .msg) all
/// share one signature and are reported as the generic container type.
pub fn detect_content_type(data: &[u8]) -> Option<DetectedType> {
    if data.starts_with(b"%PDF") {
        return Some(detected("application/pdf", "pdf"));
    }
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(detected("image/png", "png"));
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(detected("image/jpeg", "jpg"));
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some(detected("image/gif", "gif"));
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some(detected("image/webp", "webp"));
    }
    if data.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A]) {
        return Some(detected("image/tiff", "tiff"));
    }
    if data.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
        return Some(detected("application/zip", "zip"));
    }
    if data.starts_with(&[0x1F, 0x8B]) {
        return Some(detected("application/gzip", "gz"));
    }
    if data.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]) {
        return Some(detected("application/x-ole-storage", "doc"));
    }
    if data.starts_with(b"BM") && data.len() >= 14 {
        return Some(detected("image/bmp", "bmp"));
    }
    if looks_like_text(data) {
        return Some(detected("text/plain", "txt"));
    }
    None
}

/// Plain-text heuristic: non-empty, NUL-free, valid UTF-8 over the sampled
/// prefix (a sequence truncated by the sample boundary still counts).
fn looks_like_text(data: &[u8]) -> bool {
    if data.is_empty() {
        return false;
    }
    let sample = &data[..data.len().min(TEXT_SNIFF_LEN)];
    if sample.contains(&0) {
        return false;
    }
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

fn declared_extension_is(declared_name: &str, extension: &str) -> bool {
    declared_name
        .to_lowercase()
        .ends_with(&format!(".{}", extension))
}

/// Sanitize a declared filename against a detected extension.
///
/// The stem (declared name minus its final extension) keeps only letters,
/// digits, `_` and `-`; whitespace runs become a single underscore and
/// repeated underscores collapse. The detected extension is always the one
/// appended, so a mislabeled file is renamed to match its true type. An
/// empty stem degenerates to just `.{extension}`.
pub fn sanitize_filename(declared_name: &str, detected_extension: &str) -> String {
    let stem = match declared_name.rfind('.') {
        Some(idx) => &declared_name[..idx],
        None => declared_name,
    };

    let mut sanitized = String::with_capacity(stem.len());
    let mut in_whitespace = false;
    for c in stem.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                sanitized.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            sanitized.push(c);
        }
    }

    let mut collapsed = String::with_capacity(sanitized.len());
    let mut prev_underscore = false;
    for c in sanitized.chars() {
        if c == '_' {
            if !prev_underscore {
                collapsed.push(c);
            }
            prev_underscore = true;
        } else {
            prev_underscore = false;
            collapsed.push(c);
        }
    }

    format!("{}.{}", collapsed, detected_extension)
}

/// Validate an upload: size, true content type, allow-list, filename.
///
/// Pure over the byte buffer and name; the caller performs the storage
/// write only after this succeeds, so a rejected upload leaves nothing
/// behind.
pub fn validate_upload(
    data: &[u8],
    declared_name: &str,
    declared_content_type: Option<&str>,
    max_size: usize,
) -> Result<ValidatedUpload, ValidationError> {
    if data.len() > max_size {
        return Err(ValidationError::FileTooLarge {
            size: data.len(),
            max: max_size,
        });
    }

    let sniffed = detect_content_type(data);

    let resolved = match sniffed {
        // Outlook .msg is an OLE2 container; the declared name settles the
        // container-in-container ambiguity.
        Some(t)
            if t.mime == "application/x-ole-storage"
                && declared_extension_is(declared_name, "msg") =>
        {
            detected("application/vnd.ms-outlook", "msg")
        }
        Some(t) => t,
        // RFC 822 mail has no signature; accept on the declared extension.
        None if declared_extension_is(declared_name, "eml") => detected("message/rfc822", "eml"),
        None => {
            return Err(ValidationError::UnsupportedType {
                detected: "unknown".to_string(),
            })
        }
    };

    if !ALLOWED_MIME_TYPES.contains(&resolved.mime) {
        return Err(ValidationError::UnsupportedType {
            detected: resolved.mime.to_string(),
        });
    }

    if let Some(declared) = declared_content_type {
        let declared_normalized = declared.split(';').next().unwrap_or(declared).trim();
        if !declared_normalized.eq_ignore_ascii_case(resolved.mime) {
            tracing::debug!(
                declared = %declared_normalized,
                detected = %resolved.mime,
                filename = %declared_name,
                "Declared content type does not match detected type; using detected"
            );
        }
    }

    Ok(ValidatedUpload {
        sanitized_filename: sanitize_filename(declared_name, resolved.extension),
        content_type: resolved.mime.to_string(),
        extension: resolved.extension.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 10 * 1024 * 1024;

    fn pdf_bytes() -> Vec<u8> {
        b"%PDF-1.7 fake body".to_vec()
    }

    #[test]
    fn sanitize_strips_disallowed_characters() {
        assert_eq!(sanitize_filename("file@name.txt", "txt"), "filename.txt");
    }

    #[test]
    fn sanitize_replaces_whitespace_with_underscore() {
        assert_eq!(
            sanitize_filename("my document.txt", "txt"),
            "my_document.txt"
        );
    }

    #[test]
    fn sanitize_empty_name_degenerates_to_extension() {
        assert_eq!(sanitize_filename("", "txt"), ".txt");
    }

    #[test]
    fn sanitize_detected_extension_wins_and_stem_dots_are_stripped() {
        assert_eq!(
            sanitize_filename("archive.tar.gz", "zip"),
            "archivetar.zip"
        );
    }

    #[test]
    fn sanitize_collapses_underscore_runs() {
        assert_eq!(
            sanitize_filename("a  b___c !!.pdf", "pdf"),
            "a_b_c_.pdf"
        );
    }

    #[test]
    fn oversized_payload_rejected() {
        let data = pdf_bytes();
        let err = validate_upload(&data, "big.pdf", None, 4).unwrap_err();
        assert!(matches!(err, ValidationError::FileTooLarge { size: 18, .. }));
    }

    #[test]
    fn pdf_is_detected_and_accepted() {
        let result = validate_upload(&pdf_bytes(), "report.pdf", None, MAX).unwrap();
        assert_eq!(result.content_type, "application/pdf");
        assert_eq!(result.sanitized_filename, "report.pdf");
    }

    #[test]
    fn mislabeled_file_is_renamed_to_true_type() {
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];
        let result = validate_upload(&png, "photo.pdf", Some("application/pdf"), MAX).unwrap();
        assert_eq!(result.content_type, "image/png");
        assert_eq!(result.sanitized_filename, "photo.png");
    }

    #[test]
    fn declared_type_is_never_trusted() {
        // An unknown binary declared as a PDF is still rejected.
        let data = [0x00, 0x01, 0x02, 0x03];
        let err = validate_upload(&data, "evil.bin", Some("application/pdf"), MAX).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedType { .. }));
    }

    #[test]
    fn unsupported_type_carries_detected_mime() {
        let gif = b"GIF89a trailer".to_vec();
        let result = validate_upload(&gif, "anim.gif", None, MAX).unwrap();
        assert_eq!(result.content_type, "image/gif");

        let unknown = [0xDE, 0xAD, 0xBE, 0xEF, 0x00];
        let err = validate_upload(&unknown, "blob", None, MAX).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedType {
                detected: "unknown".to_string()
            }
        );
    }

    #[test]
    fn eml_accepted_when_sniffing_fails() {
        // A body the text heuristic rejects (NUL byte) but named .eml.
        let data = [0x41, 0x00, 0x42];
        let result = validate_upload(&data, "message.eml", None, MAX).unwrap();
        assert_eq!(result.content_type, "message/rfc822");
        assert_eq!(result.sanitized_filename, "message.eml");
    }

    #[test]
    fn msg_overrides_generic_compound_file() {
        let mut data = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        data.extend_from_slice(&[0u8; 16]);
        let result = validate_upload(&data, "mail thread.msg", None, MAX).unwrap();
        assert_eq!(result.content_type, "application/vnd.ms-outlook");
        assert_eq!(result.sanitized_filename, "mail_thread.msg");

        // Same bytes without the .msg name stay the generic container type.
        let result = validate_upload(&data, "ledger.doc", None, MAX).unwrap();
        assert_eq!(result.content_type, "application/x-ole-storage");
        assert_eq!(result.sanitized_filename, "ledger.doc");
    }

    #[test]
    fn utf8_text_detected_as_plain_text() {
        let data = "case notes: visit on 2026-03-02\n".as_bytes();
        let result = validate_upload(data, "notes.csv", None, MAX).unwrap();
        assert_eq!(result.content_type, "text/plain");
        // Detected extension wins over the declared .csv.
        assert_eq!(result.sanitized_filename, "notes.txt");
    }

    #[test]
    fn empty_payload_is_not_text() {
        assert_eq!(detect_content_type(&[]), None);
    }
}
