//! Image OCR via an external engine process.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::ExtractError;

/// Run the configured OCR command over an image, returning recognized text.
///
/// The command is invoked Tesseract-style (`<command> stdin stdout`): image
/// bytes are written to its stdin and the recognized text is read from
/// stdout. The engine itself is an external collaborator; any alternative
/// honoring the same convention can be configured via `OCR_COMMAND`.
pub(crate) async fn recognize(command: &str, bytes: Vec<u8>) -> Result<String, ExtractError> {
    let mut child = Command::new(command)
        .arg("stdin")
        .arg("stdout")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| ExtractError::Ocr(format!("failed to spawn '{command}': {err}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| ExtractError::Ocr("OCR process stdin unavailable".to_string()))?;
    stdin
        .write_all(&bytes)
        .await
        .map_err(|err| ExtractError::Ocr(format!("failed to feed image bytes: {err}")))?;
    drop(stdin);

    let output = child
        .wait_with_output()
        .await
        .map_err(|err| ExtractError::Ocr(format!("failed to collect OCR output: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractError::Ocr(format!(
            "'{command}' exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
