use std::sync::LazyLock;

use regex::Regex;

use super::{ParsedRecord, RecordParser};
use crate::extract::ExtractedText;

static INGREDIENTS_HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*ingr[ée]dients?\s*:?\s*(.*)$").ok());
static INSTRUCTIONS_HEADER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:pr[ée]paration|instructions?|[ée]tapes|steps|method|m[ée]thode|directions)\s*:?\s*(.*)$",
    )
    .ok()
});
static STEP_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\d+\s*[.)]|[-•*]|step\s+\d+\s*:?|étape\s+\d+\s*:?)\s*").ok());

const DEFAULT_TITLE: &str = "Recipe";
const MAX_TITLE_CHARS: usize = 100;

/// Title, ingredients section and instructions section. Several recipes
/// may follow each other in one document.
pub struct RecipeParser;

#[derive(Debug, PartialEq)]
enum Section {
    Preamble,
    Ingredients,
    Instructions,
}

#[derive(Default)]
struct Draft {
    title: Option<String>,
    ingredients: Vec<String>,
    instructions: Vec<String>,
    page: u32,
}

impl Draft {
    fn into_record(self) -> Option<ParsedRecord> {
        if self.ingredients.is_empty() && self.instructions.is_empty() {
            return None;
        }
        Some(ParsedRecord::Recipe {
            title: self.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            ingredients: self.ingredients,
            instructions: self.instructions,
            page: self.page,
        })
    }
}

fn capture_rest(re: &LazyLock<Option<Regex>>, line: &str) -> Option<String> {
    let re = re.as_ref()?;
    re.captures(line)
        .map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()).unwrap_or_default())
}

fn strip_step(line: &str) -> String {
    match STEP_PREFIX.as_ref() {
        Some(re) => re.replace(line, "").trim().to_string(),
        None => line.trim().to_string(),
    }
}

fn looks_like_title(line: &str) -> bool {
    let words = line.split_whitespace().count();
    words > 0
        && words <= 8
        && line.chars().count() < MAX_TITLE_CHARS
        && !line.ends_with('.')
        && !line.starts_with(|ch: char| ch.is_ascii_digit())
}

impl RecordParser for RecipeParser {
    fn parse(&self, extracted: &ExtractedText) -> Vec<ParsedRecord> {
        let mut records = Vec::new();
        let mut draft = Draft::default();
        let mut section = Section::Preamble;

        for page in &extracted.pages {
            for raw_line in page.text.lines() {
                let line = raw_line.trim();
                if line.is_empty() {
                    continue;
                }

                if let Some(rest) = capture_rest(&INGREDIENTS_HEADER, line) {
                    if section == Section::Instructions {
                        // A new recipe: its title was read as the last step.
                        let title = match draft.instructions.last() {
                            Some(last) if looks_like_title(last) => draft.instructions.pop(),
                            _ => None,
                        };
                        let finished = std::mem::take(&mut draft);
                        records.extend(finished.into_record());
                        draft.title = title;
                        draft.page = page.page_number;
                    }
                    if draft.page == 0 {
                        draft.page = page.page_number;
                    }
                    section = Section::Ingredients;
                    draft.ingredients.extend(ingredient_entries(&rest));
                    continue;
                }

                if let Some(rest) = capture_rest(&INSTRUCTIONS_HEADER, line) {
                    section = Section::Instructions;
                    if !rest.is_empty() {
                        draft.instructions.push(strip_step(&rest));
                    }
                    continue;
                }

                match section {
                    Section::Preamble => {
                        if draft.title.is_none() && line.chars().count() < MAX_TITLE_CHARS {
                            draft.title = Some(line.to_string());
                            draft.page = page.page_number;
                        }
                    }
                    Section::Ingredients => draft.ingredients.extend(ingredient_entries(line)),
                    Section::Instructions => {
                        let step = strip_step(line);
                        if step.chars().count() > 3 {
                            draft.instructions.push(step);
                        }
                    }
                }
            }
        }

        records.extend(draft.into_record());
        records
    }
}

fn ingredient_entries(line: &str) -> Vec<String> {
    let stripped = strip_step(line);
    if stripped.is_empty() {
        return Vec::new();
    }
    // `Ingrédients: farine, eau, sel` on one line.
    if stripped.contains(',') && !stripped.chars().any(|ch| ch.is_ascii_digit()) {
        return super::split_ingredients(&stripped);
    }
    if stripped.chars().count() > 2 {
        vec![stripped]
    } else {
        Vec::new()
    }
}
