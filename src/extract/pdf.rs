//! PDF text extraction on a blocking worker thread.

use super::ExtractError;

/// Extract the embedded text layer from a PDF.
///
/// `pdf-extract` walks the page tree synchronously and can be CPU-heavy on
/// large documents, so the work runs under `spawn_blocking`. A panic inside
/// the parser (malformed font programs are a known trigger) is converted into
/// an extraction failure rather than tearing down the runtime.
pub(crate) async fn extract_text(bytes: Vec<u8>) -> Result<String, ExtractError> {
    let handle = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes));

    match handle.await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(err)) => Err(ExtractError::Failed {
            format: "PDF",
            message: err.to_string(),
        }),
        Err(join_err) => Err(ExtractError::Failed {
            format: "PDF",
            message: format!("extractor panicked: {join_err}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn garbage_bytes_fail_cleanly() {
        let error = extract_text(b"not a pdf at all".to_vec()).await.unwrap_err();
        assert!(matches!(error, ExtractError::Failed { format: "PDF", .. }));
    }
}
