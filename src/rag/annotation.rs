//! Per-item allergen profiles and the safety annotation appended to every
//! answer.

use std::collections::HashMap;

use serde::Serialize;

use super::store::SearchHit;
use crate::allergens::{detect_allergens, ingredient_confidence, Allergen, AllergenProfile};
use crate::extract::display_name;

pub const GENERAL_DISCLAIMER: &str = "Allergen information is derived automatically from menu documents and may be incomplete or out of date. Always confirm with restaurant staff before ordering, especially for severe allergies.";

pub const STAFF_DISCLAIMER: &str =
    "Allergen details could not be confirmed from the menu; please check with restaurant staff.";

/// What the retrieved chunks say about one item of one restaurant.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemProfile {
    pub restaurant: String,
    pub item: String,
    pub allergens: AllergenProfile,
    pub ingredients: Vec<String>,
    /// Taken from an allergen table rather than inferred from ingredients.
    pub declared: bool,
    pub confidence: f32,
}

#[derive(Default)]
struct Accumulator {
    restaurant: String,
    item: String,
    detected: AllergenProfile,
    declared: Option<AllergenProfile>,
    ingredients: Vec<String>,
}

/// Label of a passage hit, which names no item of its own.
fn passage_label(source_file: &str, page: u32) -> String {
    format!("Menu text from {}, page {}", source_file, page)
}

/// Groups retrieved chunks by restaurant and item name, in rank order.
/// Free passages are grouped by source page and profiled from their text,
/// with no ingredient list and so no confidence.
pub fn build_item_profiles(hits: &[SearchHit]) -> Vec<ItemProfile> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut groups: HashMap<(String, String), Accumulator> = HashMap::new();

    for hit in hits {
        let metadata = &hit.chunk.metadata;
        let (item, named) = match metadata.item_name.as_deref() {
            Some(item) => (item.trim().to_string(), true),
            None => (passage_label(&metadata.source_file, metadata.page), false),
        };
        let key = (metadata.restaurant.clone(), item.to_lowercase());
        let entry = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            Accumulator {
                restaurant: metadata.restaurant.clone(),
                item: item.clone(),
                ..Accumulator::default()
            }
        });

        match &metadata.declared_allergens {
            Some(declared) => entry
                .declared
                .get_or_insert_with(AllergenProfile::new)
                .extend(&declared.iter().copied().collect()),
            None => {
                // The header names the restaurant, which must not count as
                // an ingredient.
                let body = hit.chunk.text.split_once('\n').map(|(_, body)| body).unwrap_or("");
                entry.detected.extend(&detect_allergens(body));
                if named {
                    entry.detected.extend(&detect_allergens(&item));
                }
                for ingredient in &metadata.ingredients {
                    if !entry.ingredients.contains(ingredient) {
                        entry.ingredients.push(ingredient.clone());
                    }
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .map(|acc| match acc.declared {
            Some(declared) => ItemProfile {
                restaurant: acc.restaurant,
                item: acc.item,
                allergens: declared,
                ingredients: acc.ingredients,
                declared: true,
                confidence: 1.0,
            },
            None => ItemProfile {
                confidence: ingredient_confidence(&acc.ingredients),
                restaurant: acc.restaurant,
                item: acc.item,
                allergens: acc.detected,
                ingredients: acc.ingredients,
                declared: false,
            },
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllergenWarning {
    pub restaurant: String,
    pub item: String,
    pub allergens: Vec<Allergen>,
    /// Allergens of the item the guest asked to avoid.
    pub conflicts: Vec<Allergen>,
    pub confidence: f32,
    pub declared: bool,
    pub disclaimer: Option<String>,
}

impl AllergenWarning {
    fn line(&self) -> String {
        let allergens = if self.allergens.is_empty() {
            "no listed allergens detected".to_string()
        } else {
            labels(&self.allergens)
        };
        let mut line = format!("- {} ({}): {}", self.item, self.restaurant, allergens);
        if !self.conflicts.is_empty() {
            line.push_str(&format!(
                "\n  WARNING: contains {}, which you asked to avoid.",
                labels(&self.conflicts)
            ));
        }
        if let Some(disclaimer) = &self.disclaimer {
            line.push_str(&format!("\n  {}", disclaimer));
        }
        line
    }
}

fn labels(allergens: &[Allergen]) -> String {
    allergens
        .iter()
        .map(|allergen| allergen.label())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy)]
pub struct Annotator {
    confidence_threshold: f32,
}

impl Annotator {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold,
        }
    }

    pub fn warnings(&self, profiles: &[ItemProfile], avoidance: &AllergenProfile) -> Vec<AllergenWarning> {
        profiles
            .iter()
            .map(|profile| AllergenWarning {
                restaurant: display_name(&profile.restaurant),
                item: profile.item.clone(),
                allergens: profile.allergens.to_vec(),
                conflicts: profile.allergens.intersection(avoidance).to_vec(),
                confidence: profile.confidence,
                declared: profile.declared,
                disclaimer: (profile.confidence < self.confidence_threshold)
                    .then(|| STAFF_DISCLAIMER.to_string()),
            })
            .collect()
    }

    /// The block appended to every answer. Never empty: without items it
    /// still carries the general disclaimer.
    pub fn render(&self, warnings: &[AllergenWarning], avoidance: &AllergenProfile) -> String {
        let mut lines = vec!["Allergen information:".to_string()];

        if !avoidance.is_empty() {
            lines.push(format!("You asked to avoid: {}.", avoidance));
        }

        if warnings.is_empty() {
            lines.push("- No specific menu items were identified in the retrieved information.".to_string());
        } else {
            lines.extend(warnings.iter().map(AllergenWarning::line));
        }

        if !avoidance.is_empty() && !warnings.is_empty() {
            let compatible: Vec<String> = warnings
                .iter()
                .filter(|warning| warning.conflicts.is_empty())
                .map(|warning| format!("{} ({})", warning.item, warning.restaurant))
                .collect();
            if compatible.is_empty() {
                lines.push("None of the items found is free of the allergens you asked to avoid.".to_string());
            } else {
                lines.push(format!(
                    "No listed conflict with your request: {}. Confirm with staff before ordering.",
                    compatible.join(", ")
                ));
            }
        }

        lines.push(GENERAL_DISCLAIMER.to_string());
        lines.join("\n")
    }
}
