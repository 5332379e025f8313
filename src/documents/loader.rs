//! Text extraction for PDF, DOCX and plain-text files.

use super::types::{DocumentError, DocumentKind};
use quick_xml::{Reader, events::Event};
use std::{fs::File, io::Read, path::Path};

const DOCX_BODY: &str = "word/document.xml";

/// Read the full text of `path` according to `kind`.
pub(crate) fn extract_text(path: &Path, kind: DocumentKind) -> Result<String, DocumentError> {
    match kind {
        DocumentKind::Pdf => extract_pdf(path),
        DocumentKind::Docx => extract_docx(path),
        DocumentKind::Text => extract_plain(path),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DocumentError {
    DocumentError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn extract_pdf(path: &Path) -> Result<String, DocumentError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    match std::panic::catch_unwind(|| pdf_extract::extract_text(path)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(error)) => Err(DocumentError::Pdf(error.to_string())),
        Err(_) => Err(DocumentError::Pdf("parser aborted on malformed input".into())),
    }
}

fn extract_plain(path: &Path) -> Result<String, DocumentError> {
    let bytes = std::fs::read(path).map_err(|error| io_error(path, error))?;
    let text = String::from_utf8(bytes).map_err(|_| DocumentError::Encoding(path.to_path_buf()))?;
    Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
}

fn extract_docx(path: &Path) -> Result<String, DocumentError> {
    let file = File::open(path).map_err(|error| io_error(path, error))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|error| DocumentError::Docx(error.to_string()))?;
    let mut entry = archive
        .by_name(DOCX_BODY)
        .map_err(|error| DocumentError::Docx(format!("{DOCX_BODY}: {error}")))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|error| DocumentError::Docx(error.to_string()))?;
    docx_paragraphs(&xml)
}

/// Collect `w:t` runs per `w:p` paragraph; paragraphs are joined with newlines.
fn docx_paragraphs(xml: &str) -> Result<String, DocumentError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|error| DocumentError::Docx(error.to_string()))?;
        match event {
            Event::Start(element) => match element.local_name().as_ref() {
                b"t" => in_text = true,
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Event::Empty(element) => match element.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                b"p" => paragraphs.push(String::new()),
                _ => {}
            },
            Event::End(element) => match element.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Text(text) if in_text => {
                let unescaped = text
                    .unescape()
                    .map_err(|error| DocumentError::Docx(error.to_string()))?;
                current.push_str(&unescaped);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Paris is the capital</w:t></w:r><w:r><w:t xml:space="preserve"> of France.</w:t></w:r></w:p>
    <w:p/>
    <w:p><w:r><w:t>Name</w:t><w:tab/><w:t>Value &amp; more</w:t><w:br/><w:t>next line</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    fn docx_file(body: &str) -> NamedTempFile {
        let file = tempfile::Builder::new()
            .suffix(".docx")
            .tempfile()
            .expect("temp file");
        let mut writer = zip::ZipWriter::new(file.as_file());
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer
            .start_file(DOCX_BODY, options)
            .expect("start entry");
        writer.write_all(body.as_bytes()).expect("write body");
        writer.finish().expect("finish zip");
        file
    }

    #[test]
    fn docx_runs_join_per_paragraph() {
        let file = docx_file(BODY);
        let text = extract_text(file.path(), DocumentKind::Docx).expect("docx text");
        assert_eq!(
            text,
            "Paris is the capital of France.\n\nName\tValue & more\nnext line"
        );
    }

    #[test]
    fn docx_without_body_is_rejected() {
        let file = tempfile::Builder::new()
            .suffix(".docx")
            .tempfile()
            .expect("temp file");
        let mut writer = zip::ZipWriter::new(file.as_file());
        writer
            .start_file("word/styles.xml", zip::write::SimpleFileOptions::default())
            .expect("start entry");
        writer.write_all(b"<styles/>").expect("write");
        writer.finish().expect("finish");

        let error = extract_text(file.path(), DocumentKind::Docx).unwrap_err();
        assert!(matches!(error, DocumentError::Docx(message) if message.contains(DOCX_BODY)));
    }

    #[test]
    fn plain_text_is_read_as_utf8() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all("\u{feff}héllo wörld".as_bytes()).expect("write");
        let text = extract_text(file.path(), DocumentKind::Text).expect("text");
        assert_eq!(text, "héllo wörld");
    }

    #[test]
    fn invalid_utf8_is_an_encoding_error() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(&[0xff, 0xfe, 0x00, 0xc3]).expect("write");
        assert!(matches!(
            extract_text(file.path(), DocumentKind::Text),
            Err(DocumentError::Encoding(_))
        ));
    }

    #[test]
    fn garbage_pdf_is_a_pdf_error() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(b"definitely not a pdf").expect("write");
        assert!(matches!(
            extract_text(file.path(), DocumentKind::Pdf),
            Err(DocumentError::Pdf(_))
        ));
    }
}
