//! The fourteen regulated EU allergens, their synonym table and the
//! ingredient-confidence metric used by the safety annotation.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Allergen {
    Gluten,
    Crustaceans,
    Eggs,
    Fish,
    Peanuts,
    Soybeans,
    Milk,
    TreeNuts,
    Celery,
    Mustard,
    Sesame,
    Sulphites,
    Lupin,
    Molluscs,
}

impl Allergen {
    pub const ALL: [Allergen; 14] = [
        Allergen::Gluten,
        Allergen::Crustaceans,
        Allergen::Eggs,
        Allergen::Fish,
        Allergen::Peanuts,
        Allergen::Soybeans,
        Allergen::Milk,
        Allergen::TreeNuts,
        Allergen::Celery,
        Allergen::Mustard,
        Allergen::Sesame,
        Allergen::Sulphites,
        Allergen::Lupin,
        Allergen::Molluscs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Allergen::Gluten => "gluten",
            Allergen::Crustaceans => "crustaceans",
            Allergen::Eggs => "eggs",
            Allergen::Fish => "fish",
            Allergen::Peanuts => "peanuts",
            Allergen::Soybeans => "soybeans",
            Allergen::Milk => "milk",
            Allergen::TreeNuts => "tree_nuts",
            Allergen::Celery => "celery",
            Allergen::Mustard => "mustard",
            Allergen::Sesame => "sesame",
            Allergen::Sulphites => "sulphites",
            Allergen::Lupin => "lupin",
            Allergen::Molluscs => "molluscs",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Allergen::TreeNuts => "tree nuts",
            other => other.as_str(),
        }
    }

    /// Regex fragments matched on word boundaries, case insensitive.
    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            Allergen::Gluten => &[
                "gluten", "wheat", "flour", "dough", "bread", "breadcrumbs?", "pasta", "semolina",
                "barley", "rye", "oats?", "spelt", "farine", "blé", "pâte", "chapelure", "seigle",
                "orge", "épeautre", "semoule",
            ],
            Allergen::Crustaceans => &[
                "crustaceans?", "shrimps?", "prawns?", "crabs?", "lobsters?", "langoustines?",
                "crustacés?", "crevettes?", "homards?",
            ],
            Allergen::Eggs => &["eggs?", "egg yolks?", "mayonnaise", "œufs?", "oeufs?"],
            Allergen::Fish => &[
                "fish", "anchov(?:y|ies)", "anchois", "tuna", "thon", "salmon", "saumon", "cod",
                "sardines?", "poissons?",
            ],
            Allergen::Peanuts => &["peanuts?", "arachides?", "cacahu[èe]tes?"],
            Allergen::Soybeans => &["soy", "soya", "soja", "soybeans?", "tofu", "edamame"],
            Allergen::Milk => &[
                "milk", "dairy", "lactose", "cheeses?", "mozzarella", "parmesan", "parmigiano",
                "ricotta", "gorgonzola", "burrata", "pecorino", "provolone", "mascarpone",
                "emmental", "cheddar", "feta", "scamorza", "stracciatella", "cream", "butter",
                "yogh?urt", "pesto", "lait", "laitiers?", "fromages?", "crème", "beurre",
                "yaourt", "chèvre",
            ],
            Allergen::TreeNuts => &[
                "tree nuts?", "nuts", "walnuts?", "almonds?", "hazelnuts?", "pistachios?",
                "cashews?", "pecans?", "pine nuts?", "pesto", "noix", "noisettes?", "amandes?",
                "pistaches?", "fruits à coque", "pignons?",
            ],
            Allergen::Celery => &["celery", "celeriac", "céleri"],
            Allergen::Mustard => &["mustard", "moutarde", "dijon"],
            Allergen::Sesame => &["sesame", "sésame", "tahini"],
            Allergen::Sulphites => &["sulphites?", "sulfites?", "sulphur dioxide", "wine", "vin"],
            Allergen::Lupin => &["lupins?", "lupines?"],
            Allergen::Molluscs => &[
                "molluscs?", "mollusques?", "mussels?", "moules?", "clams?", "squid", "octopus",
                "calamari", "calamars?", "oysters?", "huîtres?", "scallops?", "poulpe",
            ],
        }
    }

    /// Maps a table header or list entry to a single allergen.
    pub fn from_label(label: &str) -> Option<Allergen> {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return None;
        }
        let normalized = trimmed.to_lowercase().replace(['_', '-'], " ");
        if let Some(found) = Allergen::ALL
            .iter()
            .find(|allergen| allergen.as_str() == normalized.replace(' ', "_"))
        {
            return Some(*found);
        }
        let detected = detect_allergens(&normalized);
        if detected.len() == 1 {
            detected.iter().next()
        } else {
            None
        }
    }
}

impl fmt::Display for Allergen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered set of allergens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllergenProfile(BTreeSet<Allergen>);

impl AllergenProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, allergen: Allergen) -> bool {
        self.0.insert(allergen)
    }

    pub fn extend(&mut self, other: &AllergenProfile) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn contains(&self, allergen: Allergen) -> bool {
        self.0.contains(&allergen)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Allergen> + '_ {
        self.0.iter().copied()
    }

    pub fn intersection(&self, other: &AllergenProfile) -> AllergenProfile {
        AllergenProfile(self.0.intersection(&other.0).copied().collect())
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.iter().map(Allergen::label).collect()
    }

    pub fn to_vec(&self) -> Vec<Allergen> {
        self.iter().collect()
    }
}

impl FromIterator<Allergen> for AllergenProfile {
    fn from_iter<I: IntoIterator<Item = Allergen>>(iter: I) -> Self {
        AllergenProfile(iter.into_iter().collect())
    }
}

impl fmt::Display for AllergenProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.labels().join(", "))
    }
}

static SYNONYM_PATTERNS: LazyLock<Vec<(Allergen, Regex)>> = LazyLock::new(|| {
    Allergen::ALL
        .iter()
        .filter_map(|allergen| {
            let pattern = format!(r"(?i)\b(?:{})\b", allergen.synonyms().join("|"));
            Regex::new(&pattern).ok().map(|re| (*allergen, re))
        })
        .collect()
});

/// Allergens whose synonyms appear in `text`.
pub fn detect_allergens(text: &str) -> AllergenProfile {
    if text.trim().is_empty() {
        return AllergenProfile::new();
    }
    SYNONYM_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(allergen, _)| *allergen)
        .collect()
}

/// Ingredients that carry none of the regulated allergens.
const SAFE_INGREDIENTS: &[&str] = &[
    "tomato", "tomatoes", "tomate", "tomates", "basil", "basilic", "oregano", "origan", "olive",
    "olives", "olive oil", "huile d'olive", "garlic", "ail", "onion", "onions", "oignon",
    "oignons", "pepper", "peppers", "poivron", "poivrons", "mushroom", "mushrooms",
    "champignon", "champignons", "ham", "jambon", "salami", "pepperoni", "prosciutto", "bacon",
    "lardons", "chicken", "poulet", "beef", "boeuf", "bœuf", "spinach", "épinards", "artichoke",
    "artichokes", "artichaut", "artichauts", "capers", "câpres", "rocket", "arugula", "roquette",
    "pineapple", "ananas", "corn", "maïs", "potato", "potatoes", "pommes de terre", "zucchini",
    "courgette", "courgettes", "eggplant", "aubergine", "aubergines", "salt", "sel", "poivre",
    "chili", "chilli", "piment", "jalapeño", "jalapeños", "rosemary", "romarin", "thyme", "thym",
    "parsley", "persil", "honey", "miel", "sugar", "sucre", "water", "eau", "yeast", "levure",
    "fig", "figs", "figue", "figues", "pear", "poire", "lemon", "citron", "oil", "huile",
];

/// Terms too vague to rule allergens in or out.
const AMBIGUOUS_TERMS: &[&str] = &[
    "sauce", "dressing", "spices", "spice", "seasoning", "may contain", "traces", "trace",
    "house", "special", "secret", "épices", "assaisonnement", "peut contenir", "maison",
    "garniture", "topping", "toppings",
];

static SAFE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| word_alternation(SAFE_INGREDIENTS));
static AMBIGUOUS_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| word_alternation(AMBIGUOUS_TERMS));

fn word_alternation(words: &[&str]) -> Option<Regex> {
    let escaped: Vec<String> = words.iter().map(|word| regex::escape(word)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", escaped.join("|"))).ok()
}

/// Whether an ingredient term is understood well enough to vouch for its
/// allergen content: an allergen synonym or a known-safe ingredient, and
/// never an ambiguous term.
pub fn is_recognised_ingredient(term: &str) -> bool {
    let term = term.trim();
    if term.is_empty() {
        return false;
    }
    if AMBIGUOUS_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(term))
    {
        return false;
    }
    if !detect_allergens(term).is_empty() {
        return true;
    }
    SAFE_PATTERN.as_ref().is_some_and(|re| re.is_match(term))
}

/// Share of recognised ingredient terms, in `0.0..=1.0`. No ingredients
/// means nothing can be vouched for, so the confidence is zero.
pub fn ingredient_confidence(ingredients: &[String]) -> f32 {
    let terms: Vec<&str> = ingredients
        .iter()
        .map(|term| term.trim())
        .filter(|term| !term.is_empty())
        .collect();
    if terms.is_empty() {
        return 0.0;
    }
    let recognised = terms
        .iter()
        .filter(|term| is_recognised_ingredient(term))
        .count();
    recognised as f32 / terms.len() as f32
}
