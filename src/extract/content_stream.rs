use async_trait::async_trait;
use lopdf::{content::Content, Object};

use super::text_layer::normalize_whitespace;
use super::{Document, ExtractionMethod, PageExtractor, PageResults};
use crate::core::errors::RagError;

/// Walks the raw text-showing operators of each page content stream.
/// Less accurate with embedded fonts but tolerant of files `pdf-extract`
/// rejects.
pub struct ContentStreamExtractor;

#[async_trait]
impl PageExtractor for ContentStreamExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::ContentStream
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
        let wanted = pages.to_vec();
        tokio::task::spawn_blocking(move || {
            let doc = lopdf::Document::load_mem(&bytes).map_err(RagError::extraction)?;
            let page_ids = doc.get_pages();
            Ok(wanted
                .into_iter()
                .map(|page| {
                    let text = match page_ids.get(&page) {
                        Some(page_id) => doc
                            .get_page_content(*page_id)
                            .map_err(RagError::extraction)
                            .and_then(|content| {
                                Content::decode(&content).map_err(RagError::extraction)
                            })
                            .map(|content| normalize_whitespace(&text_from_operations(&content))),
                        None => Err(RagError::Extraction(format!("page {} does not exist", page))),
                    };
                    (page, text)
                })
                .collect())
        })
        .await
        .map_err(RagError::extraction)?
    }
}

fn text_from_operations(content: &Content) -> String {
    let mut text = String::new();
    for op in &content.operations {
        match op.operator.as_str() {
            "Tj" | "'" | "\"" => {
                if matches!(op.operator.as_str(), "'" | "\"") && !text.ends_with('\n') {
                    text.push('\n');
                }
                if let Some(Object::String(bytes, _)) = op.operands.last() {
                    if let Some(decoded) = decode_pdf_string(bytes) {
                        text.push_str(&decoded);
                    }
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => {
                                if let Some(decoded) = decode_pdf_string(bytes) {
                                    text.push_str(&decoded);
                                }
                            }
                            // Large negative kerning is a word gap.
                            Object::Integer(offset) if *offset < -200 => push_space(&mut text),
                            Object::Real(offset) if *offset < -200.0 => push_space(&mut text),
                            _ => {}
                        }
                    }
                }
            }
            "Td" | "TD" => {
                let vertical = op.operands.get(1).and_then(number).unwrap_or(0.0);
                if vertical.abs() > f32::EPSILON {
                    if !text.ends_with('\n') {
                        text.push('\n');
                    }
                } else {
                    push_space(&mut text);
                }
            }
            "T*" | "ET" => {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            _ => {}
        }
    }
    text
}

fn push_space(text: &mut String) {
    if !text.is_empty() && !text.ends_with(' ') && !text.ends_with('\n') {
        text.push(' ');
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

/// UTF-16BE with BOM, UTF-8, then Latin-1 as the last resort.
fn decode_pdf_string(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }

    let decoded = if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).ok()?
    } else {
        match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => bytes.iter().map(|&b| b as char).collect(),
        }
    };

    let cleaned: String = decoded
        .chars()
        .filter(|ch| !ch.is_control() || *ch == ' ')
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Operation;

    fn string(text: &str) -> Object {
        Object::string_literal(text)
    }

    #[test]
    fn operators_become_lines() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tj", vec![string("Margherita - tomato, mozzarella")]),
                Operation::new("Td", vec![Object::Integer(0), Object::Integer(-14)]),
                Operation::new(
                    "TJ",
                    vec![Object::Array(vec![
                        string("Diavola"),
                        Object::Integer(-300),
                        string("$12"),
                    ])],
                ),
                Operation::new("ET", vec![]),
            ],
        };

        let text = normalize_whitespace(&text_from_operations(&content));
        assert_eq!(text, "Margherita - tomato, mozzarella\nDiavola $12");
    }

    #[test]
    fn decodes_utf16_with_bom() {
        let bytes = [0xFE, 0xFF, 0x00, b'C', 0x00, 0xE8, 0x00, b'n'];
        assert_eq!(decode_pdf_string(&bytes).as_deref(), Some("Cèn"));
    }

    #[test]
    fn falls_back_to_latin1() {
        assert_eq!(decode_pdf_string(&[b'p', 0xE2, b't', b'e']).as_deref(), Some("pâte"));
    }
}
