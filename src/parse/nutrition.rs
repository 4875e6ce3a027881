use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ParsedRecord, RecordParser};
use crate::extract::ExtractedText;

static CALORIES: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d+(?:[.,]\d+)?)\s*(?:kcal|calories?|cal)\b|\b(?:kcal|calories?|[ée]nergie|energy)\s*:?\s*(\d+(?:[.,]\d+)?)",
    )
    .ok()
});
static NUTRIENT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(prot[ée]ines?|proteins?|glucides?|carbohydrates?|carbs|lipides?|fats?|fibres?|fibers?|sugars?|sucres?|salt|sel)\b\s*:?\s*(\d+(?:[.,]\d+)?)\s*g\b",
    )
    .ok()
});
/// Table titles and serving notes, never item names.
static HEADING: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)nutrition|valeurs?\s+nutritionnelles?|\b(?:per|pour)\s+(?:100|portion|serving|part)").ok()
});

const MAX_NAME_WORDS: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrient {
    pub name: String,
    pub grams: f32,
}

/// Calorie and nutrient lines per item: `Margherita: 850 kcal, protein
/// 32 g`, or an item heading followed by unnamed value lines.
pub struct NutritionParser;

struct Draft {
    item: String,
    calories: Option<f32>,
    nutrients: Vec<Nutrient>,
    page: u32,
}

impl Draft {
    fn new(item: String, page: u32) -> Self {
        Self {
            item,
            calories: None,
            nutrients: Vec::new(),
            page,
        }
    }

    fn add(&mut self, facts: Facts) {
        if self.calories.is_none() {
            self.calories = facts.calories;
        }
        for nutrient in facts.nutrients {
            if !self.nutrients.iter().any(|known| known.name == nutrient.name) {
                self.nutrients.push(nutrient);
            }
        }
    }

    fn into_record(self) -> ParsedRecord {
        ParsedRecord::Nutrition {
            item: self.item,
            calories: self.calories,
            nutrients: self.nutrients,
            page: self.page,
        }
    }
}

struct Facts {
    /// Byte offset of the first value on the line.
    start: usize,
    calories: Option<f32>,
    nutrients: Vec<Nutrient>,
}

impl RecordParser for NutritionParser {
    fn parse(&self, extracted: &ExtractedText) -> Vec<ParsedRecord> {
        let mut records = Vec::new();
        let mut current: Option<Draft> = None;
        let mut pending_item: Option<String> = None;

        for page in &extracted.pages {
            for raw_line in page.text.lines() {
                let line = raw_line.trim();
                if line.is_empty() {
                    continue;
                }

                let Some(facts) = line_facts(line) else {
                    if !is_heading(line) {
                        if let Some(name) = item_name(line) {
                            pending_item = Some(name);
                        }
                    }
                    continue;
                };

                match item_name(&line[..facts.start]).or_else(|| pending_item.take()) {
                    Some(item) => {
                        records.extend(current.take().map(Draft::into_record));
                        let mut draft = Draft::new(item, page.page_number);
                        draft.add(facts);
                        current = Some(draft);
                    }
                    None => match current.as_mut() {
                        Some(draft) => draft.add(facts),
                        None => tracing::debug!(
                            "Nutrition values without an item on page {}",
                            page.page_number
                        ),
                    },
                }
            }
        }
        records.extend(current.take().map(Draft::into_record));
        records
    }
}

fn parse_number(raw: &str) -> Option<f32> {
    raw.replace(',', ".").parse().ok()
}

fn line_facts(line: &str) -> Option<Facts> {
    let mut start = line.len();
    let mut calories = None;
    if let Some(caps) = CALORIES.as_ref().and_then(|re| re.captures(line)) {
        if let Some(whole) = caps.get(0) {
            start = start.min(whole.start());
        }
        calories = caps.get(1).or_else(|| caps.get(2)).and_then(|m| parse_number(m.as_str()));
    }

    let mut nutrients = Vec::new();
    if let Some(re) = NUTRIENT.as_ref() {
        for caps in re.captures_iter(line) {
            let (Some(whole), Some(name), Some(value)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            let Some(grams) = parse_number(value.as_str()) else {
                continue;
            };
            start = start.min(whole.start());
            let name = canonical_nutrient(name.as_str()).to_string();
            if !nutrients.iter().any(|known: &Nutrient| known.name == name) {
                nutrients.push(Nutrient { name, grams });
            }
        }
    }

    (calories.is_some() || !nutrients.is_empty()).then_some(Facts {
        start,
        calories,
        nutrients,
    })
}

fn canonical_nutrient(raw: &str) -> &'static str {
    let lower = raw.to_lowercase();
    if lower.starts_with("prot") {
        "protein"
    } else if lower.starts_with("gluc") || lower.starts_with("carb") {
        "carbohydrates"
    } else if lower.starts_with("lip") || lower.starts_with("fat") {
        "fat"
    } else if lower.starts_with("fib") {
        "fibre"
    } else if lower.starts_with("sug") || lower.starts_with("suc") {
        "sugars"
    } else {
        "salt"
    }
}

fn is_heading(line: &str) -> bool {
    HEADING.as_ref().is_some_and(|re| re.is_match(line))
}

fn item_name(text: &str) -> Option<String> {
    let name = text
        .trim()
        .trim_end_matches(|ch: char| ch.is_whitespace() || matches!(ch, ':' | '-' | '–' | '|' | ',' | '.'))
        .trim();
    let words = name.split_whitespace().count();
    let plausible = name.chars().next().is_some_and(char::is_alphabetic)
        && words > 0
        && words <= MAX_NAME_WORDS
        && !name.chars().any(|ch| ch.is_ascii_digit());
    plausible.then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::tests::extracted;

    fn nutrition(record: &ParsedRecord) -> (&str, Option<f32>, &[Nutrient]) {
        match record {
            ParsedRecord::Nutrition {
                item,
                calories,
                nutrients,
                ..
            } => (item.as_str(), *calories, nutrients.as_slice()),
            other => panic!("expected nutrition record, got {other:?}"),
        }
    }

    #[test]
    fn parses_named_value_lines() {
        let text = extracted(&[
            "Valeurs nutritionnelles\nMargherita : 850 kcal, protéines 32 g, lipides 28,5 g\nMarinara - 640 kcal, carbs 98 g, salt 2 g",
        ]);
        let records = NutritionParser.parse(&text);
        assert_eq!(records.len(), 2);

        let (item, calories, nutrients) = nutrition(&records[0]);
        assert_eq!(item, "Margherita");
        assert_eq!(calories, Some(850.0));
        assert_eq!(
            nutrients,
            [
                Nutrient { name: "protein".into(), grams: 32.0 },
                Nutrient { name: "fat".into(), grams: 28.5 },
            ]
        );

        let (item, calories, nutrients) = nutrition(&records[1]);
        assert_eq!(item, "Marinara");
        assert_eq!(calories, Some(640.0));
        assert_eq!(nutrients.len(), 2);
    }

    #[test]
    fn value_lines_attach_to_the_heading_above() {
        let text = extracted(&[
            "Nutrition facts per serving\nDiavola\nCalories: 910\nProtein: 38 g\nFat 35 g\nCalzone\nEnergy: 1020 kcal",
        ]);
        let records = NutritionParser.parse(&text);
        assert_eq!(records.len(), 2);

        let (item, calories, nutrients) = nutrition(&records[0]);
        assert_eq!(item, "Diavola");
        assert_eq!(calories, Some(910.0));
        assert_eq!(nutrients.len(), 2);

        let (item, calories, _) = nutrition(&records[1]);
        assert_eq!(item, "Calzone");
        assert_eq!(calories, Some(1020.0));
    }

    #[test]
    fn text_without_values_yields_nothing() {
        let text = extracted(&["Our pizzas are baked in a wood-fired oven."]);
        assert!(NutritionParser.parse(&text).is_empty());
    }
}
