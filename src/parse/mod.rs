//! Turns extracted page text into typed records.

pub mod allergen_table;
pub mod classifier;
pub mod menu;
pub mod nutrition;
pub mod passage;
pub mod recipe;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::allergens::AllergenProfile;
use crate::extract::ExtractedText;

pub use allergen_table::AllergenTableParser;
pub use classifier::{Classification, Classifier};
pub use menu::MenuParser;
pub use nutrition::{Nutrient, NutritionParser};
pub use passage::PassageParser;
pub use recipe::RecipeParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Menu,
    AllergenTable,
    Recipe,
    Nutrition,
    Unknown,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Menu => "menu",
            DocumentType::AllergenTable => "allergen_table",
            DocumentType::Recipe => "recipe",
            DocumentType::Nutrition => "nutrition",
            DocumentType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedRecord {
    MenuItem {
        name: String,
        description: Option<String>,
        price: Option<String>,
        ingredients: Vec<String>,
        page: u32,
    },
    AllergenRow {
        item: String,
        allergens: AllergenProfile,
        page: u32,
    },
    Recipe {
        title: String,
        ingredients: Vec<String>,
        instructions: Vec<String>,
        page: u32,
    },
    Nutrition {
        item: String,
        calories: Option<f32>,
        nutrients: Vec<Nutrient>,
        page: u32,
    },
    Passage {
        text: String,
        page: u32,
    },
}

impl ParsedRecord {
    pub fn page(&self) -> u32 {
        match self {
            ParsedRecord::MenuItem { page, .. }
            | ParsedRecord::AllergenRow { page, .. }
            | ParsedRecord::Recipe { page, .. }
            | ParsedRecord::Nutrition { page, .. }
            | ParsedRecord::Passage { page, .. } => *page,
        }
    }

    /// Item the record describes, when it describes one.
    pub fn item_name(&self) -> Option<&str> {
        match self {
            ParsedRecord::MenuItem { name, .. } => Some(name),
            ParsedRecord::AllergenRow { item, .. } => Some(item),
            ParsedRecord::Recipe { title, .. } => Some(title),
            ParsedRecord::Nutrition { item, .. } => Some(item),
            ParsedRecord::Passage { .. } => None,
        }
    }

    pub fn ingredients(&self) -> &[String] {
        match self {
            ParsedRecord::MenuItem { ingredients, .. } | ParsedRecord::Recipe { ingredients, .. } => {
                ingredients
            }
            _ => &[],
        }
    }
}

pub trait RecordParser: Send + Sync {
    fn parse(&self, extracted: &ExtractedText) -> Vec<ParsedRecord>;
}

/// Parser lookup by document type. Unknown documents, and typed documents
/// whose parser finds nothing, are parsed as passages.
pub struct ParserRegistry {
    parsers: HashMap<DocumentType, Box<dyn RecordParser>>,
    fallback: PassageParser,
}

impl ParserRegistry {
    pub fn new() -> Self {
        let mut parsers: HashMap<DocumentType, Box<dyn RecordParser>> = HashMap::new();
        parsers.insert(DocumentType::Menu, Box::new(MenuParser));
        parsers.insert(DocumentType::AllergenTable, Box::new(AllergenTableParser));
        parsers.insert(DocumentType::Recipe, Box::new(RecipeParser));
        parsers.insert(DocumentType::Nutrition, Box::new(NutritionParser));
        Self {
            parsers,
            fallback: PassageParser,
        }
    }

    pub fn parse(&self, document_type: DocumentType, extracted: &ExtractedText) -> Vec<ParsedRecord> {
        let records = match self.parsers.get(&document_type) {
            Some(parser) => parser.parse(extracted),
            None => Vec::new(),
        };
        if !records.is_empty() {
            return records;
        }
        if document_type != DocumentType::Unknown {
            tracing::info!(
                "{} parser found no records in {}, falling back to passages",
                document_type,
                extracted.document_id
            );
        }
        self.fallback.parse(extracted)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits an ingredient list on commas, semicolons and the conjunctions
/// `and` / `et` / `&`.
pub(crate) fn split_ingredients(raw: &str) -> Vec<String> {
    let mut normalized = format!(" {} ", raw);
    for conjunction in [" and ", " et ", " & ", " with ", " avec "] {
        normalized = normalized.replace(conjunction, ",");
        normalized = normalized.replace(&conjunction.to_uppercase(), ",");
    }
    normalized
        .split([',', ';', '/', '·'])
        .map(|part| {
            part.trim()
                .trim_matches(|ch: char| ch == '.' || ch == '-' || ch == '–' || ch == '*' || ch == '•')
                .trim()
                .to_string()
        })
        .filter(|part| !part.is_empty() && part.chars().any(char::is_alphabetic))
        .collect()
}
