//! Sanitization of clean files before they become available.
//!
//! Runs only after a `clean` verdict; the output is stored under the safe
//! key, leaving the original upload untouched.

use async_trait::async_trait;
use img_parts::{jpeg::Jpeg, png::Png, ImageEXIF};

#[derive(Debug, thiserror::Error)]
pub enum SanitizeError {
    #[error("Sanitization failed: {0}")]
    Failed(String),
}

/// Produces a safe copy of a clean payload.
#[async_trait]
pub trait Sanitizer: Send + Sync {
    async fn sanitize(&self, data: Vec<u8>, content_type: &str) -> Result<Vec<u8>, SanitizeError>;
}

/// Default sanitizer: strips EXIF from JPEG/PNG payloads and passes every
/// other content type through unchanged.
pub struct DefaultSanitizer;

impl DefaultSanitizer {
    fn remove_exif(data: Vec<u8>) -> Vec<u8> {
        if let Ok(mut jpeg) = Jpeg::from_bytes(data.clone().into()) {
            jpeg.set_exif(None);
            return jpeg.encoder().bytes().to_vec();
        }

        if let Ok(mut png) = Png::from_bytes(data.clone().into()) {
            png.set_exif(None);
            return png.encoder().bytes().to_vec();
        }

        data
    }
}

#[async_trait]
impl Sanitizer for DefaultSanitizer {
    async fn sanitize(&self, data: Vec<u8>, content_type: &str) -> Result<Vec<u8>, SanitizeError> {
        match content_type {
            "image/jpeg" | "image/png" => Ok(Self::remove_exif(data)),
            _ => Ok(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_image_payload_passes_through_unchanged() {
        let data = b"%PDF-1.7 body".to_vec();
        let out = DefaultSanitizer
            .sanitize(data.clone(), "application/pdf")
            .await
            .unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn malformed_jpeg_falls_back_to_original_bytes() {
        // Declared as JPEG but not parseable; the payload is returned as-is
        // rather than failing the pipeline.
        let data = vec![0xFF, 0xD8, 0xFF, 0x00, 0x01];
        let out = DefaultSanitizer
            .sanitize(data.clone(), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn text_payload_passes_through() {
        let data = b"hello".to_vec();
        let out = DefaultSanitizer
            .sanitize(data.clone(), "text/plain")
            .await
            .unwrap();
        assert_eq!(out, data);
    }
}
