//! PDF text extraction with a per-page fallback chain.

pub mod content_stream;
pub mod ocr;
pub mod text_layer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::config::ExtractionConfig;
use crate::core::errors::RagError;

pub use content_stream::ContentStreamExtractor;
pub use ocr::OcrExtractor;
pub use text_layer::TextLayerExtractor;

/// An inbound PDF. The bytes are shared and never mutated.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    /// Collection name, e.g. `anchor_pizza`.
    pub restaurant: String,
    pub display_name: String,
    pub source_path: PathBuf,
    pub bytes: Arc<[u8]>,
    pub content_hash: String,
}

impl Document {
    /// Reads `path`, deriving the id and restaurant from its location
    /// relative to `documents_dir`.
    pub fn load(documents_dir: &Path, path: &Path) -> Result<Self, RagError> {
        let bytes = std::fs::read(path)?;
        let relative = path.strip_prefix(documents_dir).unwrap_or(path);
        let (id, restaurant) = identify(relative);
        Ok(Self::from_bytes(id, restaurant, path.to_path_buf(), bytes))
    }

    pub fn from_bytes(
        id: impl Into<String>,
        restaurant: impl Into<String>,
        source_path: PathBuf,
        bytes: Vec<u8>,
    ) -> Self {
        let restaurant = restaurant.into();
        let content_hash = hex::encode(Sha256::digest(&bytes));
        Document {
            id: id.into(),
            display_name: display_name(&restaurant),
            restaurant,
            source_path,
            bytes: Arc::from(bytes),
            content_hash,
        }
    }

    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }
}

/// Document id and restaurant slug for a path relative to the inbound directory.
pub fn identify(relative: &Path) -> (String, String) {
    let components: Vec<String> = relative
        .with_extension("")
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();

    let id = components
        .iter()
        .map(|part| slugify(part))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("__");

    // A PDF inside a sub-directory belongs to the restaurant named by that
    // directory; a top-level PDF names the restaurant itself.
    let restaurant = components
        .first()
        .map(|part| slugify(part))
        .unwrap_or_default();

    (id, restaurant)
}

/// Lowercase ASCII-ish slug: runs of non-alphanumerics collapse to `_`.
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

/// `anchor_pizza` -> `Anchor Pizza`.
pub fn display_name(slug: &str) -> String {
    slug.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    TextLayer,
    ContentStream,
    Ocr,
}

impl ExtractionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionMethod::TextLayer => "text_layer",
            ExtractionMethod::ContentStream => "content_stream",
            ExtractionMethod::Ocr => "ocr",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub page_number: u32,
    pub text: String,
    pub method: ExtractionMethod,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedText {
    pub document_id: String,
    pub pages: Vec<ExtractedPage>,
    pub skipped_pages: Vec<u32>,
}

impl ExtractedText {
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn mean_confidence(&self) -> f32 {
        if self.pages.is_empty() {
            return 0.0;
        }
        self.pages.iter().map(|page| page.confidence).sum::<f32>() / self.pages.len() as f32
    }
}

/// Text of the requested pages, one entry per page. A per-page error is
/// recoverable; the outer error means the method cannot read the document.
pub type PageResults = Vec<(u32, Result<String, RagError>)>;

#[async_trait]
pub trait PageExtractor: Send + Sync {
    fn method(&self) -> ExtractionMethod;

    fn is_available(&self) -> bool {
        true
    }

    async fn page_count(&self, document: &Document) -> Result<u32, RagError>;

    async fn extract_pages(
        &self,
        document: &Document,
        pages: &[u32],
    ) -> Result<PageResults, RagError>;
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, document: &Document) -> Result<ExtractedText, RagError>;
}

/// Tries each method in order on the pages the previous ones left empty.
pub struct FallbackExtractor {
    methods: Vec<Box<dyn PageExtractor>>,
    min_text_chars: usize,
}

impl FallbackExtractor {
    pub fn new(methods: Vec<Box<dyn PageExtractor>>, min_text_chars: usize) -> Self {
        Self {
            methods,
            min_text_chars: min_text_chars.max(1),
        }
    }

    /// Text layer, then content stream, then OCR when enabled.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let mut methods: Vec<Box<dyn PageExtractor>> = vec![
            Box::new(TextLayerExtractor),
            Box::new(ContentStreamExtractor),
        ];
        if config.ocr_enabled {
            methods.push(Box::new(OcrExtractor::new(
                config.ocr_language.clone(),
                config.ocr_dpi,
                config.ocr_timeout(),
            )));
        }
        Self::new(methods, config.min_text_chars)
    }

    async fn page_count(&self, document: &Document) -> Result<u32, RagError> {
        let mut last_error = None;
        for method in &self.methods {
            match method.page_count(document).await {
                Ok(count) => return Ok(count),
                Err(err) => {
                    tracing::debug!(
                        "{} cannot open {}: {}",
                        method.method().as_str(),
                        document.id,
                        err
                    );
                    last_error = Some(err);
                }
            }
        }
        Err(RagError::Extraction(format!(
            "no extraction method can open {}: {}",
            document.id,
            last_error.map(|err| err.to_string()).unwrap_or_else(|| "no methods configured".to_string())
        )))
    }
}

#[async_trait]
impl Extractor for FallbackExtractor {
    async fn extract(&self, document: &Document) -> Result<ExtractedText, RagError> {
        let page_count = self.page_count(document).await?;
        let mut pending: Vec<u32> = (1..=page_count).collect();
        let mut pages = Vec::with_capacity(pending.len());

        for method in &self.methods {
            if pending.is_empty() {
                break;
            }
            if !method.is_available() {
                tracing::debug!("{} unavailable, skipping", method.method().as_str());
                continue;
            }

            let results = match method.extract_pages(document, &pending).await {
                Ok(results) => results,
                Err(err) => {
                    tracing::warn!(
                        "{} failed for {}: {}",
                        method.method().as_str(),
                        document.id,
                        err
                    );
                    continue;
                }
            };

            for (page_number, result) in results {
                match result {
                    Ok(text) if text.trim().chars().count() >= self.min_text_chars => {
                        pending.retain(|page| *page != page_number);
                        pages.push(ExtractedPage {
                            page_number,
                            confidence: text_confidence(&text),
                            text,
                            method: method.method(),
                        });
                    }
                    Ok(_) => tracing::debug!(
                        "Page {} of {} is empty with {}",
                        page_number,
                        document.id,
                        method.method().as_str()
                    ),
                    Err(err) => tracing::debug!(
                        "Page {} of {} failed with {}: {}",
                        page_number,
                        document.id,
                        method.method().as_str(),
                        err
                    ),
                }
            }
        }

        for page in &pending {
            tracing::warn!("Skipping page {} of {}: no method produced text", page, document.id);
        }

        if pages.is_empty() {
            return Err(RagError::Extraction(format!(
                "no text could be extracted from any page of {}",
                document.id
            )));
        }

        pages.sort_by_key(|page| page.page_number);
        Ok(ExtractedText {
            document_id: document.id.clone(),
            pages,
            skipped_pages: pending,
        })
    }
}

const DOMAIN_TERMS: [&str; 14] = [
    "pizza",
    "pizzeria",
    "menu",
    "ingredient",
    "ingrédient",
    "allergen",
    "allergène",
    "gluten",
    "lactose",
    "fromage",
    "tomate",
    "recette",
    "recipe",
    "prix",
];

/// Text-quality heuristic in `0.0..=1.0`: length, word count, character
/// variety, garbling and domain vocabulary.
pub fn text_confidence(text: &str) -> f32 {
    let trimmed = text.trim();
    if trimmed.chars().count() < 5 {
        return 0.0;
    }

    let words = trimmed.split_whitespace().count();
    let length_score = match words {
        0..=9 => 0.1,
        10..=49 => 0.5,
        50..=199 => 0.8,
        _ => 1.0,
    };

    let lower = trimmed.to_lowercase();
    let distinct = lower
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<std::collections::HashSet<_>>()
        .len();
    let mut coherence: f32 = 0.5;
    if distinct > 10 {
        coherence += 0.2;
    }
    let total = trimmed.chars().count();
    let odd = trimmed
        .chars()
        .filter(|ch| !ch.is_alphanumeric() && !ch.is_whitespace() && !".,;:!?-'()€$%/&".contains(*ch))
        .count();
    if (odd as f32) < total as f32 * 0.1 {
        coherence += 0.2;
    }
    if !["@@", "##", "||", "???"].iter().any(|garble| trimmed.contains(garble)) {
        coherence += 0.1;
    }

    let found = DOMAIN_TERMS.iter().filter(|term| lower.contains(*term)).count();
    let relevance = (found as f32 / 5.0).min(1.0);

    (0.3 * length_score + 0.3 * coherence.min(1.0) + 0.4 * relevance).clamp(0.0, 1.0)
}
