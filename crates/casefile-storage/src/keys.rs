//! Shared key generation for storage backends.
//!
//! Key format: originals at `files/{uuid}.{ext}`, sanitized copies at
//! `files/safe/{uuid}.{ext}`. All backends must use this format.

use uuid::Uuid;

/// Generate the unique storage filename for a new upload.
pub fn storage_filename(file_id: Uuid, extension: &str) -> String {
    format!("{}.{}", file_id, extension)
}

/// Storage key for a sanitized safe copy, distinct from the original's key.
pub fn safe_storage_key(file_id: Uuid, extension: &str) -> String {
    format!("files/safe/{}.{}", file_id, extension)
}

/// Storage key for an uploaded filename.
pub(crate) fn object_key(filename: &str) -> String {
    format!("files/{}", filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_key_differs_from_original_key() {
        let id = Uuid::new_v4();
        let original = object_key(&storage_filename(id, "pdf"));
        let safe = safe_storage_key(id, "pdf");
        assert_ne!(original, safe);
        assert!(safe.starts_with("files/safe/"));
    }
}
