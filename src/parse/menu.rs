use std::sync::LazyLock;

use regex::Regex;

use super::{split_ingredients, ParsedRecord, RecordParser};
use crate::extract::ExtractedText;

static PRICE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:[$€£]\s?\d+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?\s?(?:€|\$|£|eur(?:os?)?\b))",
    )
    .ok()
});

/// Separators between an item name and its description.
const SEPARATORS: [&str; 5] = [" – ", " — ", " - ", ": ", " | "];

/// Labels that open a detail line of the preceding item rather than a new
/// item, as in `Ingrédients : tomate, mozzarella`.
const DETAIL_LABELS: [&str; 14] = [
    "ingredients",
    "ingrédients",
    "ingredienti",
    "ingredientes",
    "garniture",
    "garnish",
    "topping",
    "toppings",
    "composition",
    "allergens",
    "allergènes",
    "allergenes",
    "contains",
    "contient",
];

const MAX_NAME_WORDS: usize = 6;
const MAX_NAME_CHARS: usize = 60;

/// Menu lines such as `Margherita - tomato, mozzarella, basil $10`.
/// Continuation lines add ingredients or a price to the preceding item.
pub struct MenuParser;

#[derive(Debug, Default)]
struct Draft {
    name: String,
    description: Vec<String>,
    price: Option<String>,
    ingredients: Vec<String>,
    page: u32,
}

impl Draft {
    fn has_details(&self) -> bool {
        self.price.is_some() || !self.ingredients.is_empty() || !self.description.is_empty()
    }

    fn into_record(self) -> ParsedRecord {
        let description = self.description.join(" ");
        ParsedRecord::MenuItem {
            name: self.name,
            description: (!description.is_empty()).then_some(description),
            price: self.price,
            ingredients: self.ingredients,
            page: self.page,
        }
    }
}

impl RecordParser for MenuParser {
    fn parse(&self, extracted: &ExtractedText) -> Vec<ParsedRecord> {
        let mut records = Vec::new();
        let mut current: Option<Draft> = None;

        for page in &extracted.pages {
            for raw_line in page.text.lines() {
                let line = raw_line.trim();
                if line.is_empty() {
                    continue;
                }

                if let Some(rest) = detail_line(line) {
                    if let Some(draft) = current.as_mut() {
                        absorb(draft, rest);
                    }
                    continue;
                }

                if let Some((name, rest)) = split_item_line(line) {
                    flush(&mut current, &mut records);
                    let mut draft = Draft {
                        name,
                        page: page.page_number,
                        ..Draft::default()
                    };
                    absorb(&mut draft, &rest);
                    current = Some(draft);
                    continue;
                }

                if let Some(name) = bare_title(line) {
                    flush(&mut current, &mut records);
                    current = Some(Draft {
                        name,
                        page: page.page_number,
                        ..Draft::default()
                    });
                    continue;
                }

                // Continuation of the preceding item.
                if let Some(draft) = current.as_mut() {
                    absorb(draft, line);
                }
            }
        }
        flush(&mut current, &mut records);
        records
    }
}

fn flush(current: &mut Option<Draft>, records: &mut Vec<ParsedRecord>) {
    if let Some(draft) = current.take() {
        // A title nothing was attached to is a section heading.
        if draft.has_details() {
            records.push(draft.into_record());
        }
    }
}

/// First price on the line and the line with every price removed.
fn take_price(text: &str) -> (Option<String>, String) {
    let Some(re) = PRICE.as_ref() else {
        return (None, text.to_string());
    };
    let price = re.find(text).map(|found| found.as_str().trim().to_string());
    let stripped = re.replace_all(text, " ").to_string();
    (price, stripped)
}

fn absorb(draft: &mut Draft, text: &str) {
    let (price, rest) = take_price(text);
    if draft.price.is_none() {
        draft.price = price;
    }
    let rest = clean_fragment(&rest);
    if rest.is_empty() {
        return;
    }
    let ingredients = split_ingredients(&rest);
    if !ingredients.is_empty() {
        draft.ingredients.extend(ingredients);
        draft.description.push(rest);
    }
}

fn clean_fragment(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|ch: char| {
            ch.is_whitespace() || matches!(ch, '-' | '–' | '—' | ':' | '|' | '.' | '…' | '*' | '•')
        })
        .to_string()
}

fn plausible_name(name: &str) -> bool {
    let words = name.split_whitespace().count();
    name.chars().next().is_some_and(char::is_alphabetic)
        && words > 0
        && words <= MAX_NAME_WORDS
        && name.chars().count() <= MAX_NAME_CHARS
        && !name.contains(',')
}

/// Text after the label of a detail line.
fn detail_line(line: &str) -> Option<&str> {
    let (label, rest) = line.split_once(':')?;
    let label = clean_fragment(label).to_lowercase();
    DETAIL_LABELS.contains(&label.as_str()).then_some(rest)
}

/// `Name <sep> rest`, or `Name ..... $10`.
fn split_item_line(line: &str) -> Option<(String, String)> {
    let separator = SEPARATORS
        .iter()
        .filter_map(|sep| line.find(sep).map(|index| (index, *sep)))
        .min_by_key(|(index, _)| *index);

    if let Some((index, sep)) = separator {
        let name = clean_fragment(&line[..index]);
        if plausible_name(&name) && take_price(&name).0.is_none() {
            return Some((name, line[index + sep.len()..].to_string()));
        }
    }

    // Name followed directly by a price, with optional dot leaders.
    let (price, rest) = take_price(line);
    if let Some(price) = price {
        let name = clean_fragment(&rest);
        if plausible_name(&name) && split_ingredients(&name).len() == 1 && starts_uppercase(&name) {
            return Some((name, price));
        }
    }
    None
}

fn starts_uppercase(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_uppercase)
}

/// A capitalised line with no list or digits, e.g. `Margherita` on its own.
fn bare_title(line: &str) -> Option<String> {
    let name = clean_fragment(line);
    let words = name.split_whitespace().count();
    if starts_uppercase(&name)
        && words <= 4
        && plausible_name(&name)
        && !name.chars().any(|ch| ch.is_ascii_digit())
        && split_ingredients(&name).len() == 1
    {
        Some(name)
    } else {
        None
    }
}
