//! Record-aware chunking.
//!
//! Each parsed record becomes one chunk when its rendering fits the
//! configured size. Larger records are split on ingredient, sentence and
//! word boundaries with the header line repeated in every fragment, so a
//! fragment on its own still names its restaurant and item. Passages use a
//! sliding window with overlap.

use serde::{Deserialize, Serialize};

use crate::allergens::Allergen;
use crate::core::config::ChunkingConfig;
use crate::extract::Document;
use crate::parse::{DocumentType, ParsedRecord};

/// Fragments never get less room than this, whatever the header length.
const MIN_BODY_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub restaurant: String,
    pub source_file: String,
    pub document_type: DocumentType,
    pub record_index: usize,
    pub ordinal: usize,
    pub fragment: usize,
    pub fragment_count: usize,
    pub page: u32,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub declared_allergens: Option<Vec<Allergen>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

pub fn chunk_id(document_id: &str, ordinal: usize) -> String {
    format!("{}#{}", document_id, ordinal)
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(MIN_BODY_CHARS),
            chunk_overlap: config.chunk_overlap.min(config.chunk_size / 2),
        }
    }

    pub fn chunk(
        &self,
        document: &Document,
        document_type: DocumentType,
        records: &[ParsedRecord],
    ) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for (record_index, record) in records.iter().enumerate() {
            let header = render_header(document, document_type, record);
            let body = render_body(record);
            let budget = self
                .chunk_size
                .saturating_sub(header.chars().count() + 1)
                .max(MIN_BODY_CHARS);

            let fragments = match record {
                ParsedRecord::Passage { .. } => sliding_window(&body, budget, self.chunk_overlap),
                _ => split_units(&body, budget),
            };
            let fragment_count = fragments.len();

            let (ingredients, declared_allergens) = match record {
                ParsedRecord::AllergenRow { allergens, .. } => (Vec::new(), Some(allergens.to_vec())),
                other => (other.ingredients().to_vec(), None),
            };

            for (fragment, text) in fragments.into_iter().enumerate() {
                let ordinal = chunks.len();
                chunks.push(Chunk {
                    id: chunk_id(&document.id, ordinal),
                    text: if text.is_empty() {
                        header.clone()
                    } else {
                        format!("{}\n{}", header, text)
                    },
                    metadata: ChunkMetadata {
                        document_id: document.id.clone(),
                        restaurant: document.restaurant.clone(),
                        source_file: document.file_name(),
                        document_type,
                        record_index,
                        ordinal,
                        fragment,
                        fragment_count,
                        page: record.page(),
                        item_name: record.item_name().map(str::to_string),
                        ingredients: ingredients.clone(),
                        declared_allergens: declared_allergens.clone(),
                    },
                });
            }
        }

        tracing::debug!("Chunked {} records of {} into {} chunks", records.len(), document.id, chunks.len());
        chunks
    }
}

fn render_header(document: &Document, document_type: DocumentType, record: &ParsedRecord) -> String {
    let mut parts = vec![format!("Restaurant: {}", document.display_name)];
    match record {
        ParsedRecord::MenuItem { name, price, .. } => {
            parts.push(format!("Item: {}", name));
            if let Some(price) = price {
                parts.push(format!("Price: {}", price));
            }
            parts.push(format!("Type: {}", DocumentType::Menu));
        }
        ParsedRecord::AllergenRow { item, .. } => {
            parts.push(format!("Item: {}", item));
            parts.push(format!("Type: {}", DocumentType::AllergenTable));
        }
        ParsedRecord::Recipe { title, .. } => {
            parts.push(format!("Item: {}", title));
            parts.push(format!("Type: {}", DocumentType::Recipe));
        }
        ParsedRecord::Nutrition { item, .. } => {
            parts.push(format!("Item: {}", item));
            parts.push(format!("Type: {}", DocumentType::Nutrition));
        }
        ParsedRecord::Passage { .. } => parts.push(format!("Type: {}", document_type)),
    }
    parts.join(" | ")
}

fn render_body(record: &ParsedRecord) -> String {
    match record {
        ParsedRecord::MenuItem {
            description,
            ingredients,
            ..
        } => {
            let mut lines = Vec::new();
            let joined = ingredients.join(", ");
            if !ingredients.is_empty() {
                lines.push(format!("Ingredients: {}", joined));
            }
            if let Some(description) = description {
                if description.trim() != joined {
                    lines.push(format!("Description: {}", description));
                }
            }
            lines.join("\n")
        }
        ParsedRecord::AllergenRow { allergens, .. } => {
            if allergens.is_empty() {
                "Allergens: none declared".to_string()
            } else {
                format!("Allergens: {}", allergens)
            }
        }
        ParsedRecord::Recipe {
            ingredients,
            instructions,
            ..
        } => {
            let mut lines = Vec::new();
            if !ingredients.is_empty() {
                lines.push(format!("Ingredients: {}", ingredients.join(", ")));
            }
            if !instructions.is_empty() {
                lines.push("Instructions:".to_string());
                for (index, step) in instructions.iter().enumerate() {
                    lines.push(format!("{}. {}", index + 1, step));
                }
            }
            lines.join("\n")
        }
        ParsedRecord::Nutrition {
            calories,
            nutrients,
            ..
        } => {
            let mut lines = Vec::new();
            if let Some(calories) = calories {
                lines.push(format!("Calories: {} kcal", calories));
            }
            if !nutrients.is_empty() {
                let values = nutrients
                    .iter()
                    .map(|nutrient| format!("{} {} g", nutrient.name, nutrient.grams))
                    .collect::<Vec<_>>()
                    .join(", ");
                lines.push(format!("Nutrients: {}", values));
            }
            lines.join("\n")
        }
        ParsedRecord::Passage { text, .. } => text.clone(),
    }
}

const UNIT_SEPARATORS: [&str; 4] = ["\n", ", ", ". ", " "];

/// Greedy packing of boundary-delimited units into fragments of at most
/// `budget` characters.
fn split_units(body: &str, budget: usize) -> Vec<String> {
    let body = body.trim();
    if body.chars().count() <= budget {
        return vec![body.to_string()];
    }
    split_with(body, budget, &UNIT_SEPARATORS)
}

fn split_with(text: &str, budget: usize, separators: &[&str]) -> Vec<String> {
    let Some((separator, rest)) = separators.split_first() else {
        return hard_split(text, budget);
    };

    let pieces: Vec<&str> = text.split_inclusive(separator).collect();
    if pieces.len() <= 1 {
        return split_with(text, budget, rest);
    }

    let mut fragments = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        let piece_len = piece.chars().count();
        if piece_len > budget {
            push_trimmed(&mut fragments, std::mem::take(&mut current));
            fragments.extend(split_with(piece, budget, rest));
            continue;
        }
        if current.chars().count() + piece_len > budget {
            push_trimmed(&mut fragments, std::mem::take(&mut current));
        }
        current.push_str(piece);
    }
    push_trimmed(&mut fragments, current);
    fragments
}

fn push_trimmed(fragments: &mut Vec<String>, fragment: String) {
    let trimmed = fragment
        .trim()
        .trim_end_matches(',')
        .trim()
        .to_string();
    if !trimmed.is_empty() {
        fragments.push(trimmed);
    }
}

fn hard_split(text: &str, budget: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(budget.max(1))
        .map(|chunk| chunk.iter().collect::<String>())
        .filter(|chunk| !chunk.trim().is_empty())
        .map(|chunk| chunk.trim().to_string())
        .collect()
}

/// Windows of `size` characters overlapping by `overlap`, cut at a sentence
/// ending inside the last fifth of the window when there is one.
fn sliding_window(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if total == 0 {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut start = 0;
    while start < total {
        let mut end = (start + size).min(total);
        if end < total {
            if let Some(cut) = sentence_boundary(&chars[start..end]) {
                end = start + cut;
            }
        }

        let window: String = chars[start..end].iter().collect();
        let window = window.trim();
        if !window.is_empty() {
            windows.push(window.to_string());
        }

        if end >= total {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }
    windows
}

/// Position just past the last sentence ending in the final 20% of `window`.
fn sentence_boundary(window: &[char]) -> Option<usize> {
    let search_start = window.len() * 80 / 100;
    (search_start..window.len().saturating_sub(1))
        .rev()
        .find(|&index| matches!(window[index], '.' | '!' | '?') && window[index + 1].is_whitespace())
        .map(|index| index + 2)
}
