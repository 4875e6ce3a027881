use async_trait::async_trait;

use super::{Document, ExtractionMethod, PageExtractor, PageResults};
use crate::core::errors::RagError;

/// Embedded text layer read with `pdf-extract`, which handles font
/// encodings better than walking operators by hand.
pub struct TextLayerExtractor;

#[async_trait]
impl PageExtractor for TextLayerExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::TextLayer
    }

    async fn page_count(&self, document: &Document) -> Result<u32, RagError> {
        let bytes = document.bytes.clone();
        tokio::task::spawn_blocking(move || {
            let doc = lopdf::Document::load_mem(&bytes).map_err(RagError::extraction)?;
            Ok(doc.get_pages().len() as u32)
        })
        .await
        .map_err(RagError::extraction)?
    }

    async fn extract_pages(
        &self,
        document: &Document,
        pages: &[u32],
    ) -> Result<PageResults, RagError> {
        let bytes = document.bytes.clone();
        let all_pages = tokio::task::spawn_blocking(move || {
            // pdf-extract panics on some malformed fonts.
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                pdf_extract::extract_text_from_mem_by_pages(&bytes)
            }))
        })
        .await
        .map_err(RagError::extraction)?
        .map_err(|_| RagError::extraction("pdf-extract panicked while reading the text layer"))?
        .map_err(RagError::extraction)?;

        Ok(pages
            .iter()
            .map(|page| {
                let text = all_pages
                    .get((*page as usize).saturating_sub(1))
                    .map(|text| normalize_whitespace(text))
                    .ok_or_else(|| RagError::Extraction(format!("page {} not in text layer", page)));
                (*page, text)
            })
            .collect())
    }
}

/// Collapses runs of spaces inside lines and drops blank-line runs longer
/// than one, keeping the line structure the parsers rely on.
pub(crate) fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(&collapsed);
        out.push('\n');
    }
    out.trim().to_string()
}
