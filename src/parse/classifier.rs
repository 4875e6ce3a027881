use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::DocumentType;
use crate::extract::ExtractedText;

/// Scores are counted in tenths so that sums compare exactly against the
/// threshold.
const KEYWORD_TENTHS: u32 = 1;
const PATTERN_TENTHS: u32 = 2;
const MAX_TENTHS: u32 = 10;
/// The best score must exceed this for a typed classification.
const MIN_SCORE: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub document_type: DocumentType,
    pub score: f32,
}

struct TypePatterns {
    document_type: DocumentType,
    keywords: &'static [&'static str],
    patterns: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::warn!("Invalid classification pattern {}: {}", pattern, err);
                None
            }
        })
        .collect()
}

static TABLE: LazyLock<Vec<TypePatterns>> = LazyLock::new(|| {
    vec![
        TypePatterns {
            document_type: DocumentType::Menu,
            keywords: &[
                "menu", "carte", "pizzas", "nos pizzas", "our pizzas", "prix", "price",
                "margherita", "calzone", "starters", "entrées", "desserts", "boissons", "drinks",
            ],
            patterns: compile(&[
                r"(?i)\d+(?:[.,]\d{1,2})?\s?(?:€|eur\b|euros?\b)",
                r"(?i)(?:\$|€|£)\s?\d+",
                r"(?m)^[A-ZÀ-Ý][\wÀ-ÿ' ]{2,40}\s[-–—:|]\s",
                r"(?i)\b(?:small|medium|large|petite|moyenne|grande)\b",
            ]),
        },
        TypePatterns {
            document_type: DocumentType::AllergenTable,
            keywords: &[
                "allergen", "allergène", "allergy", "allergie", "gluten", "lactose", "contains",
                "contient", "traces", "sesame", "sésame", "moutarde", "mustard",
            ],
            patterns: compile(&[
                r"(?i)allerg(?:en|ène|y|ie)s?\s+(?:table|information|informations|list|liste|chart|matrix)",
                r"(?i)\b(?:gluten|milk|lait)\b.*\b(?:eggs?|œufs?|oeufs?|fish|poisson)\b.*\b(?:nuts|noix|soja|soy|mustard|moutarde|celery|céleri)\b",
                r"(?im)(?:^|\s)(?:x|✓|✔|yes|oui)\s+(?:x|✓|✔|yes|oui|-)(?:\s|$)",
                r"(?im)^[^:\n]{2,40}:\s*(?:gluten|milk|lait|eggs?|œufs?|nuts|noix|soja|fish|poisson)\b",
            ]),
        },
        TypePatterns {
            document_type: DocumentType::Recipe,
            keywords: &[
                "recette", "recipe", "ingrédients", "ingredients", "préparation", "preparation",
                "instructions", "étapes", "steps", "cuisson", "bake", "four", "oven",
            ],
            patterns: compile(&[
                r"(?i)\d+\s?(?:g|kg|ml|cl|l|grammes?|cuillères?|tbsp|tsp|cups?)\b",
                r"(?m)^\s*\d+[.)]\s+\w",
                r"(?i)\b(?:préchauffe[rz]?|preheat|pétrir|knead|mélange[rz]?|mix)\b",
                r"(?i)\d+\s?°\s?[cf]?",
            ]),
        },
        TypePatterns {
            document_type: DocumentType::Nutrition,
            keywords: &[
                "nutrition", "nutritionnelle", "kcal", "calories", "protein", "protéines",
                "glucides", "lipides", "carbohydrates", "fibres", "sugars", "sucres",
            ],
            patterns: compile(&[
                r"(?i)\d+\s*(?:kcal|calories?)\b",
                r"(?i)\b(?:prot[ée]ines?|proteins?|glucides?|carbohydrates?|lipides?|fats?|fibres?|sugars?|sucres?)\b\s*:?\s*\d+(?:[.,]\d+)?\s*g\b",
                r"(?i)\b(?:per|pour)\s+(?:100\s?g|portion|serving|part)\b",
                r"(?i)valeurs?\s+nutritionnelles?|nutrition(?:al)?\s+(?:facts|information|values)",
            ]),
        },
    ]
});

pub struct Classifier;

impl Classifier {
    pub fn classify(extracted: &ExtractedText) -> Classification {
        Self::classify_text(&extracted.full_text())
    }

    pub fn classify_text(text: &str) -> Classification {
        if text.trim().is_empty() {
            return Classification {
                document_type: DocumentType::Unknown,
                score: 0.0,
            };
        }
        let lower = text.to_lowercase();

        let mut best = Classification {
            document_type: DocumentType::Unknown,
            score: 0.0,
        };
        for entry in TABLE.iter() {
            let score = type_score(entry, text, &lower);
            tracing::debug!("Classification score for {}: {:.2}", entry.document_type, score);
            if score > best.score {
                best = Classification {
                    document_type: entry.document_type,
                    score,
                };
            }
        }

        if best.score > MIN_SCORE {
            best
        } else {
            tracing::info!(
                "Classification ambiguous (best score {:.2}), using generic passages",
                best.score
            );
            Classification {
                document_type: DocumentType::Unknown,
                score: best.score,
            }
        }
    }
}

fn type_score(entry: &TypePatterns, text: &str, lower: &str) -> f32 {
    let keyword_hits = entry
        .keywords
        .iter()
        .filter(|keyword| lower.contains(*keyword))
        .count();
    let pattern_hits = entry
        .patterns
        .iter()
        .filter(|pattern| pattern.is_match(text))
        .count();
    let tenths = keyword_hits as u32 * KEYWORD_TENTHS + pattern_hits as u32 * PATTERN_TENTHS;
    tenths.min(MAX_TENTHS) as f32 / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_text_classifies_as_menu() {
        let text = "NOS PIZZAS\nMargherita - tomato, mozzarella, basil $10\nCalzone - ham, ricotta 12,50 €\nDesserts";
        let result = Classifier::classify_text(text);
        assert_eq!(result.document_type, DocumentType::Menu);
        assert!(result.score > MIN_SCORE);
    }

    #[test]
    fn allergen_matrix_classifies_as_allergen_table() {
        let text = "Allergen information\nPizza | Gluten | Milk | Eggs | Nuts\nMargherita | x | x | - | -\nMarinara | x | - | - | -";
        let result = Classifier::classify_text(text);
        assert_eq!(result.document_type, DocumentType::AllergenTable);
    }

    #[test]
    fn recipe_text_classifies_as_recipe() {
        let text = "Pâte à pizza\nIngrédients:\n500 g de farine\n10 g de sel\nPréparation:\n1. Mélanger la farine et le sel.\n2. Préchauffer le four à 250°C.";
        let result = Classifier::classify_text(text);
        assert_eq!(result.document_type, DocumentType::Recipe);
    }

    #[test]
    fn nutrition_text_classifies_as_nutrition() {
        let text = "Valeurs nutritionnelles pour 100 g\nMargherita : 850 kcal, protéines 32 g, lipides 28 g\nMarinara : 640 kcal, glucides 98 g";
        let result = Classifier::classify_text(text);
        assert_eq!(result.document_type, DocumentType::Nutrition);
    }

    #[test]
    fn unrelated_text_is_unknown() {
        let result = Classifier::classify_text("Opening hours: every day except Monday.");
        assert_eq!(result.document_type, DocumentType::Unknown);
        assert!(result.score <= MIN_SCORE);
    }

    #[test]
    fn score_at_threshold_is_unknown() {
        // One keyword (margherita) and one pattern (the separator line).
        let text = "Margherita - tomato, mozzarella, basil\nMarinara - tomato, garlic, oregano";
        let result = Classifier::classify_text(text);
        assert_eq!(result.score, MIN_SCORE);
        assert_eq!(result.document_type, DocumentType::Unknown);

        let result = Classifier::classify_text(&format!("Our pizzas\n{}", text));
        assert!(result.score > MIN_SCORE);
        assert_eq!(result.document_type, DocumentType::Menu);
    }

    #[test]
    fn score_is_capped_at_one() {
        let text = "menu carte pizzas nos pizzas our pizzas prix price margherita calzone starters entrées desserts boissons drinks 10 € $5";
        let result = Classifier::classify_text(text);
        assert!((result.score - 1.0).abs() < f32::EPSILON);
    }
}
