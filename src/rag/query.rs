//! Question analysis: which restaurants to search and which allergens the
//! guest wants to avoid.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::retrieval::CollectionScope;
use crate::allergens::{detect_allergens, Allergen, AllergenProfile};
use crate::extract::slugify;

/// Phrases that name an allergen to avoid on their own.
static SELF_CONTAINED: LazyLock<Vec<(Regex, Allergen)>> = LazyLock::new(|| {
    [
        (r"lactose[- ]?(?:intoleran(?:t|ce)|free)", Allergen::Milk),
        (r"intol[ée]ran(?:t|te|ce)s? au lactose", Allergen::Milk),
        (r"sans lactose", Allergen::Milk),
        (r"(?:dairy|milk)[- ]free", Allergen::Milk),
        (r"non[- ]dairy", Allergen::Milk),
        (r"c(?:o|oe|œ)?eliac", Allergen::Gluten),
        (r"c[oœ]eliaque", Allergen::Gluten),
        (r"gluten[- ]?(?:free|intoleran(?:t|ce))", Allergen::Gluten),
        (r"sans gluten", Allergen::Gluten),
        (r"nut[- ]free", Allergen::TreeNuts),
        (r"peanut[- ]free", Allergen::Peanuts),
        (r"egg[- ]free", Allergen::Eggs),
        (r"sans (?:œufs?|oeufs?)", Allergen::Eggs),
    ]
    .into_iter()
    .filter_map(|(pattern, allergen)| {
        Regex::new(&format!(r"(?i)\b{}\b", pattern))
            .ok()
            .map(|re| (re, allergen))
    })
    .collect()
});

/// Words that turn allergen mentions into things to avoid.
static AVOIDANCE_CUE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:no|not|without|avoid(?:ing)?|allerg(?:y|ies|ic)|intoleran(?:t|ce)|free of|can'?t eat|cannot eat|sans|[ée]viter|allergi(?:e|que)s?|intol[ée]rante?|pas de|ne mange pas|ne peu[xt] pas manger)\b",
    )
    .ok()
});

static ALLERGEN_TOPIC: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\ballerg[eè]n(?:e|es|s)?\b|\ballergy\b|\bsafe\b").ok());

/// A capitalised name following a venue cue, e.g. `at Luigi's`.
static VENUE_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"\b(?i:at|from|chez|restaurant|pizzeria)\s+(?:(?i:the)\s+)?(\p{Lu}[\p{L}'’-]*(?:\s+\p{Lu}[\p{L}'’-]*){0,2})",
    )
    .ok()
});

/// Slug tokens that say nothing about which restaurant is meant.
const GENERIC_NAME_TOKENS: [&str; 14] = [
    "pizza", "pizzas", "pizzeria", "restaurant", "trattoria", "menu", "menus", "carte", "the",
    "chez", "allergens", "allergenes", "recipes", "recettes",
];

/// Capitalised words after `at` / `from` that name a time, not a venue.
const NOT_VENUES: [&str; 48] = [
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "lundi",
    "mardi", "mercredi", "jeudi", "vendredi", "samedi", "dimanche", "january", "february",
    "march", "april", "may", "june", "july", "august", "september", "october", "november",
    "december", "janvier", "février", "mars", "avril", "mai", "juin", "juillet", "août",
    "septembre", "octobre", "novembre", "décembre", "christmas", "easter", "noël", "pâques",
    "halloween", "thanksgiving", "new", "noon", "midnight", "weekend",
];

const MIN_DISTINCTIVE_CHARS: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct QueryAnalysis {
    pub scope: CollectionScope,
    /// Restaurant slugs named in the question, known or not.
    pub restaurants: Vec<String>,
    pub avoidance: AllergenProfile,
    /// The question is about allergens at all.
    pub allergen_question: bool,
}

/// Routes questions to collections by the restaurant names they mention.
#[derive(Debug, Clone, Default)]
pub struct QueryAnalyzer {
    known: Vec<String>,
}

impl QueryAnalyzer {
    /// `known` holds the collection slugs currently in the store.
    pub fn new(known: Vec<String>) -> Self {
        Self { known }
    }

    pub fn analyze(&self, question: &str) -> QueryAnalysis {
        let restaurants = self.restaurants_in(question);
        let avoidance = requested_avoidance(question);
        let allergen_question = !avoidance.is_empty()
            || ALLERGEN_TOPIC.as_ref().is_some_and(|re| re.is_match(question))
            || !detect_allergens(question).is_empty();

        let scope = if restaurants.is_empty() {
            CollectionScope::All
        } else {
            CollectionScope::Only(restaurants.clone())
        };

        tracing::debug!(
            "Question routed to {:?}, avoiding [{}]",
            scope,
            avoidance
        );
        QueryAnalysis {
            scope,
            restaurants,
            avoidance,
            allergen_question,
        }
    }

    fn restaurants_in(&self, question: &str) -> Vec<String> {
        // `_`-delimited so that matches fall on word boundaries.
        let haystack = format!("_{}_", slugify(question));

        let mut found: Vec<String> = self
            .known
            .iter()
            .filter(|slug| {
                haystack.contains(&format!("_{}_", slug))
                    || distinctive_tokens(slug).any(|token| haystack.contains(&format!("_{}_", token)))
            })
            .cloned()
            .collect();

        if found.is_empty() {
            if let Some(re) = VENUE_NAME.as_ref() {
                for caps in re.captures_iter(question) {
                    let Some(name) = caps.get(1) else { continue };
                    let slug = slugify(name.as_str());
                    if slug.is_empty()
                        || Allergen::from_label(name.as_str()).is_some()
                        || names_a_time(name.as_str())
                    {
                        continue;
                    }
                    if !found.contains(&slug) {
                        found.push(slug);
                    }
                }
            }
        }
        found
    }
}

fn names_a_time(name: &str) -> bool {
    name.split_whitespace()
        .next()
        .is_some_and(|first| NOT_VENUES.contains(&first.to_lowercase().as_str()))
}

fn distinctive_tokens(slug: &str) -> impl Iterator<Item = &str> {
    slug.split('_').filter(|token| {
        token.chars().count() >= MIN_DISTINCTIVE_CHARS && !GENERIC_NAME_TOKENS.contains(token)
    })
}

/// Allergens the guest asked to avoid.
pub fn requested_avoidance(question: &str) -> AllergenProfile {
    let mut profile: AllergenProfile = SELF_CONTAINED
        .iter()
        .filter(|(re, _)| re.is_match(question))
        .map(|(_, allergen)| *allergen)
        .collect();

    if AVOIDANCE_CUE.as_ref().is_some_and(|re| re.is_match(question)) {
        profile.extend(&detect_allergens(question));
    }
    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> QueryAnalyzer {
        QueryAnalyzer::new(vec!["anchor_pizza".to_string(), "marco_fuso".to_string()])
    }

    #[test]
    fn lactose_intolerance_means_milk() {
        let profile = requested_avoidance("I'm lactose intolerant, what can I order?");
        assert!(profile.contains(Allergen::Milk));
        assert!(requested_avoidance("Je suis intolérant au lactose").contains(Allergen::Milk));
        assert!(requested_avoidance("Any dairy-free pizzas?").contains(Allergen::Milk));
    }

    #[test]
    fn cue_words_turn_mentions_into_avoidance() {
        let profile = requested_avoidance("A pizza with no nuts and without mozzarella please");
        assert!(profile.contains(Allergen::TreeNuts));
        assert!(profile.contains(Allergen::Milk));
        assert!(requested_avoidance("Pizza sans gluten?").contains(Allergen::Gluten));
        assert!(requested_avoidance("I'm coeliac").contains(Allergen::Gluten));
    }

    #[test]
    fn plain_mentions_are_not_avoidance() {
        assert!(requested_avoidance("Which pizzas have mozzarella?").is_empty());
        assert!(requested_avoidance("What's the price of the Margherita?").is_empty());
    }

    #[test]
    fn routes_known_restaurants() {
        let analysis = analyzer().analyze("What does Anchor Pizza charge for a calzone?");
        assert_eq!(analysis.scope, CollectionScope::Only(vec!["anchor_pizza".to_string()]));

        let analysis = analyzer().analyze("Quelles pizzas chez Marco ?");
        assert_eq!(analysis.restaurants, ["marco_fuso"]);

        let analysis = analyzer().analyze("What's the price of the Margherita?");
        assert_eq!(analysis.scope, CollectionScope::All);
    }

    #[test]
    fn unknown_venue_routes_to_missing_collection() {
        let analysis = analyzer().analyze("How much is a Margherita at Luigi's Trattoria?");
        assert_eq!(analysis.restaurants, ["luigi_s_trattoria"]);
        assert!(!analysis.scope.is_all());
    }

    #[test]
    fn days_and_holidays_are_not_venues() {
        let analysis = analyzer().analyze("Are you open from Monday?");
        assert!(analysis.restaurants.is_empty());
        assert!(analysis.scope.is_all());

        let analysis = analyzer().analyze("Do you serve special pizzas at Christmas?");
        assert!(analysis.restaurants.is_empty());

        let analysis = analyzer().analyze("Is the Diavola at Luigi on Sunday?");
        assert_eq!(analysis.restaurants, ["luigi"]);
    }

    #[test]
    fn detects_allergen_questions() {
        assert!(analyzer().analyze("Which allergens are in the Diavola?").allergen_question);
        assert!(!analyzer().analyze("What time do you open?").allergen_question);
    }
}
