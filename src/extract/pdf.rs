use pdf_extract::extract_text_from_mem;

/// Text of every page, in page order.
pub(super) fn read_pdf(bytes: &[u8]) -> Result<String, String> {
    extract_text_from_mem(bytes).map_err(|e| format!("failed to extract PDF text: {}", e))
}
