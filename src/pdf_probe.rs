// src/pdf_probe.rs

use crate::error::ExtractError;
use lopdf::Document;
use tracing::{debug, warn};

pub const PDF_MIME: &str = "application/pdf";

const SIGNATURE: &[u8] = b"%PDF-";

/// Readers accept the header anywhere in the first KiB, so do we.
const HEADER_WINDOW: usize = 1024;

/// Reject anything that is obviously not a PDF before it is uploaded.
pub fn check_signature(bytes: &[u8]) -> Result<(), ExtractError> {
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    if window.windows(SIGNATURE.len()).any(|w| w == SIGNATURE) {
        Ok(())
    } else {
        Err(ExtractError::NotPdf)
    }
}

/// Number of pages according to lopdf, or `None` when the structure
/// cannot be parsed locally. The remote service gets the final say.
pub fn page_count(bytes: &[u8]) -> Option<usize> {
    match Document::load_mem(bytes) {
        Ok(doc) => {
            let pages = doc.get_pages().len();
            debug!(pages, "Parsed PDF structure");
            Some(pages)
        }
        Err(e) => {
            warn!(error = %e, "lopdf could not parse PDF structure; uploading anyway");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes() {
        let result = check_signature(b"this is not a pdf");
        assert!(matches!(result, Err(ExtractError::NotPdf)));
    }

    #[test]
    fn test_empty_bytes() {
        assert!(matches!(check_signature(b""), Err(ExtractError::NotPdf)));
    }

    #[test]
    fn test_signature_after_leading_junk() {
        let mut bytes = vec![0u8; 16];
        bytes.extend_from_slice(b"%PDF-1.7\n");
        assert!(check_signature(&bytes).is_ok());
    }

    #[test]
    fn test_signature_outside_window() {
        let mut bytes = vec![b' '; HEADER_WINDOW];
        bytes.extend_from_slice(b"%PDF-1.7\n");
        assert!(check_signature(&bytes).is_err());
    }

    #[test]
    fn test_truncated_pdf_has_no_page_count() {
        assert_eq!(page_count(b"%PDF-1.4\n%%EOF"), None);
    }
}
