//! Image content-type detection.
//!
//! Uploads are classified by their magic bytes, not by the client-supplied
//! header, so a renamed file cannot slip past the image check.

/// Content types accepted for inspection photos.
pub const SUPPORTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Detect a supported image type from file content.
pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    let kind = infer::get(bytes)?;
    let mime = kind.mime_type();
    SUPPORTED_IMAGE_TYPES.iter().copied().find(|t| *t == mime)
}

/// Map a content type to a file extension for storage keys.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "application/pdf" => "pdf",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn test_sniff_png_and_jpeg() {
        assert_eq!(sniff_image_type(PNG_HEADER), Some("image/png"));
        assert_eq!(sniff_image_type(JPEG_HEADER), Some("image/jpeg"));
    }

    #[test]
    fn test_sniff_rejects_non_images() {
        assert_eq!(sniff_image_type(b"%PDF-1.5 hello"), None);
        assert_eq!(sniff_image_type(b"plain text"), None);
        assert_eq!(sniff_image_type(&[]), None);
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("application/pdf"), "pdf");
        assert_eq!(extension_for("application/x-unknown"), "bin");
    }
}
