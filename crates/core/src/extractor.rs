use crate::error::IngestError;
use lopdf::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    PlainText,
}

impl DocumentFormat {
    pub fn detect(file_name: &str, file_type: &str) -> Self {
        let is_pdf = file_type.eq_ignore_ascii_case("application/pdf")
            || std::path::Path::new(file_name)
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            Self::Pdf
        } else {
            Self::PlainText
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
    let document =
        Document::load_mem(bytes).map_err(|error| IngestError::Extraction(error.to_string()))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::Extraction(error.to_string()))?;

        if !text.trim().is_empty() {
            pages.push(PageText {
                number: page_no,
                text,
            });
        }
    }

    if pages.is_empty() {
        return Err(IngestError::Extraction(
            "pdf had no readable page text".to_string(),
        ));
    }

    Ok(pages)
}

/// Raw upload bytes to document text. PDF pages are joined with blank lines.
pub fn extract_text(bytes: &[u8], file_name: &str, file_type: &str) -> Result<String, IngestError> {
    match DocumentFormat::detect(file_name, file_type) {
        DocumentFormat::Pdf => Ok(extract_pdf_pages(bytes)?
            .into_iter()
            .map(|page| page.text)
            .collect::<Vec<_>>()
            .join("\n\n")),
        DocumentFormat::PlainText => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_detected_from_mime_or_extension() {
        assert_eq!(
            DocumentFormat::detect("manual.bin", "application/pdf"),
            DocumentFormat::Pdf
        );
        assert_eq!(DocumentFormat::detect("Manual.PDF", ""), DocumentFormat::Pdf);
        assert_eq!(
            DocumentFormat::detect("notes.md", "text/markdown"),
            DocumentFormat::PlainText
        );
    }

    #[test]
    fn plain_text_is_decoded_lossily() -> Result<(), IngestError> {
        let text = extract_text(b"pump \xffvalve", "notes.txt", "text/plain")?;
        assert_eq!(text, "pump \u{fffd}valve");
        Ok(())
    }

    #[test]
    fn broken_pdf_is_an_extraction_error() {
        let result = extract_text(b"%PDF-1.4\n%broken", "broken.pdf", "application/pdf");
        assert!(matches!(result, Err(IngestError::Extraction(_))));
    }
}
