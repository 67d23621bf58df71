//! PDF text extraction.

use super::FetchError;

/// Extract the text layer of a PDF on the blocking pool.
pub(crate) async fn pdf_text(bytes: Vec<u8>) -> Result<String, FetchError> {
    let size = bytes.len();
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| FetchError::Extract(format!("PDF worker failed: {e}")))?
        .map_err(|e| FetchError::Extract(e.to_string()))?;

    tracing::debug!(bytes = size, chars = text.len(), "Extracted PDF text");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn garbage_is_an_extraction_error() {
        let err = pdf_text(b"definitely not a pdf".to_vec()).await.unwrap_err();
        assert!(matches!(err, FetchError::Extract(_)));
    }
}
