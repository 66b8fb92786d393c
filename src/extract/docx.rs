//! OOXML word-processing document extraction via `zip` + `quick-xml`.

use std::io::{Cursor, Read};

use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use zip::ZipArchive;

use super::ExtractError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extract paragraph text from a DOCX archive.
///
/// Reads `word/document.xml` and collects the `<w:t>` runs; paragraph ends
/// and explicit breaks become newlines, tabs become tabs. Archive inflation
/// and XML parsing run under `spawn_blocking`.
pub(crate) async fn extract_text(bytes: Vec<u8>) -> Result<String, ExtractError> {
    let handle = tokio::task::spawn_blocking(move || extract_sync(&bytes));

    match handle.await {
        Ok(result) => result,
        Err(join_err) => Err(ExtractError::Failed {
            format: "DOCX",
            message: format!("extractor panicked: {join_err}"),
        }),
    }
}

fn extract_sync(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|err| ExtractError::Failed {
        format: "DOCX",
        message: format!("not a readable OOXML archive: {err}"),
    })?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| ExtractError::Failed {
            format: "DOCX",
            message: format!("archive has no {DOCUMENT_PART}"),
        })?
        .read_to_string(&mut xml)
        .map_err(|err| ExtractError::Failed {
            format: "DOCX",
            message: err.to_string(),
        })?;

    Ok(document_xml_to_text(&xml))
}

fn document_xml_to_text(xml: &str) -> String {
    let mut reader = XmlReader::from_str(xml);
    reader.trim_text(false);

    let mut text = String::new();
    let mut buf = Vec::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"t" => {
                in_run_text = true;
            }
            Ok(Event::Text(ref t)) if in_run_text => {
                if let Ok(value) = t.unescape() {
                    text.push_str(&value);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_run_text = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"br" => text.push('\n'),
                b"tab" => text.push('\t'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    text
}
