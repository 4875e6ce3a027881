use std::sync::LazyLock;

use regex::Regex;

use super::{ParsedRecord, RecordParser};
use crate::allergens::{Allergen, AllergenProfile};
use crate::extract::ExtractedText;

/// Cells that mark an allergen as present.
const PRESENT_MARKS: [&str; 11] = ["x", "✓", "✔", "yes", "oui", "•", "●", "*", "+", "y", "o"];
/// Cells that explicitly mark it absent.
const ABSENT_MARKS: [&str; 7] = ["-", "–", "no", "non", "n", "0", "·"];
/// List-form values meaning "no allergens".
const NONE_VALUES: [&str; 5] = ["none", "aucun", "aucune", "nothing", "néant"];
/// Left-hand sides of `key: value` lines that are not items.
const NOT_ITEMS: [&str; 8] = [
    "allergens",
    "allergènes",
    "contains",
    "contient",
    "may contain",
    "peut contenir",
    "traces",
    "note",
];

const MIN_HEADER_COLUMNS: usize = 3;

static STRUCTURED_SPLIT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\s{2,}|;").ok());

/// Delimiters that keep empty cells, so a blank cell still occupies its
/// column.
const CELL_DELIMITERS: [char; 2] = ['|', '\t'];

/// Allergen matrices (a header naming at least three allergen columns,
/// rows marking presence) and `Item: gluten, milk` lists.
pub struct AllergenTableParser;

struct Header {
    /// Allergen per column index, `None` for non-allergen columns.
    columns: Vec<Option<Allergen>>,
    structured: bool,
}

impl Header {
    fn allergen_columns(&self) -> usize {
        self.columns.iter().filter(|column| column.is_some()).count()
    }

    fn first_allergen_column(&self) -> usize {
        self.columns
            .iter()
            .position(Option::is_some)
            .unwrap_or(self.columns.len())
    }
}

impl RecordParser for AllergenTableParser {
    fn parse(&self, extracted: &ExtractedText) -> Vec<ParsedRecord> {
        let mut records = Vec::new();
        let mut header: Option<Header> = None;

        for page in &extracted.pages {
            for raw_line in page.text.lines() {
                let line = raw_line.trim().trim_matches('|').trim();
                if line.is_empty() {
                    continue;
                }

                if let Some(found) = parse_header(line) {
                    header = Some(found);
                    continue;
                }

                if let Some(active) = &header {
                    if let Some((item, allergens)) = parse_matrix_row(active, line) {
                        records.push(ParsedRecord::AllergenRow {
                            item,
                            allergens,
                            page: page.page_number,
                        });
                        continue;
                    }
                }

                if let Some((item, allergens)) = parse_list_line(line) {
                    records.push(ParsedRecord::AllergenRow {
                        item,
                        allergens,
                        page: page.page_number,
                    });
                }
            }
        }
        records
    }
}

fn structured_cells(line: &str) -> Vec<String> {
    if let Some(delimiter) = CELL_DELIMITERS.into_iter().find(|delimiter| line.contains(*delimiter)) {
        return line
            .split(delimiter)
            .map(|cell| cell.trim().to_string())
            .collect();
    }
    match STRUCTURED_SPLIT.as_ref() {
        Some(re) => re
            .split(line)
            .map(|cell| cell.trim().to_string())
            .filter(|cell| !cell.is_empty())
            .collect(),
        None => vec![line.to_string()],
    }
}

fn whitespace_cells(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

fn parse_header(line: &str) -> Option<Header> {
    // Headers are bare labels; `Item: gluten, milk` is a list line.
    if line.contains([':', ',']) {
        return None;
    }
    for (cells, structured) in [(structured_cells(line), true), (whitespace_cells(line), false)] {
        if structured && cells.len() < 2 {
            continue;
        }
        let columns: Vec<Option<Allergen>> =
            cells.iter().map(|cell| Allergen::from_label(cell)).collect();
        let header = Header { columns, structured };
        if header.allergen_columns() >= MIN_HEADER_COLUMNS {
            return Some(header);
        }
    }
    None
}

fn is_present(cell: &str) -> bool {
    let lower = cell.to_lowercase();
    PRESENT_MARKS.contains(&lower.as_str())
}

/// A blank cell reads as absent.
fn is_mark(cell: &str) -> bool {
    let lower = cell.to_lowercase();
    lower.is_empty() || is_present(cell) || ABSENT_MARKS.contains(&lower.as_str())
}

fn parse_matrix_row(header: &Header, line: &str) -> Option<(String, AllergenProfile)> {
    let first_column = header.first_allergen_column();

    if header.structured {
        let cells = structured_cells(line);
        if cells.len() <= first_column || cells.len() > header.columns.len() {
            return None;
        }
        let item = cells[..first_column.max(1)]
            .iter()
            .filter(|cell| !cell.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        let marks = &cells[first_column.max(1)..];
        if item.is_empty() || marks.is_empty() || !marks.iter().all(|cell| is_mark(cell)) {
            return None;
        }
        let allergens = marks
            .iter()
            .zip(header.columns[first_column.max(1)..].iter())
            .filter(|(cell, _)| is_present(cell))
            .filter_map(|(_, column)| *column)
            .collect();
        return Some((item, allergens));
    }

    // Whitespace-separated: the trailing cells are the marks, one per
    // column after the item name.
    let cells = whitespace_cells(line);
    let mark_columns = header.columns.len().saturating_sub(first_column);
    if mark_columns == 0 || cells.len() <= mark_columns {
        return None;
    }
    let split = cells.len() - mark_columns;
    let (name_cells, marks) = cells.split_at(split);
    if !marks.iter().all(|cell| is_mark(cell)) {
        return None;
    }
    let allergens = marks
        .iter()
        .zip(header.columns[first_column..].iter())
        .filter(|(cell, _)| is_present(cell))
        .filter_map(|(_, column)| *column)
        .collect();
    Some((name_cells.join(" "), allergens))
}

fn parse_list_line(line: &str) -> Option<(String, AllergenProfile)> {
    let (item, values) = line.split_once(':')?;
    let item = item.trim().trim_start_matches(['-', '•', '*']).trim();
    let item_lower = item.to_lowercase();
    if item.is_empty() || item.chars().count() > 60 || NOT_ITEMS.contains(&item_lower.as_str()) {
        return None;
    }

    let values = values.trim().trim_end_matches('.');
    if NONE_VALUES.contains(&values.to_lowercase().as_str()) {
        return Some((item.to_string(), AllergenProfile::new()));
    }

    let entries: Vec<&str> = values
        .split([',', ';', '/'])
        .flat_map(|part| part.split(" and ").flat_map(|part| part.split(" et ")))
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();
    if entries.is_empty() {
        return None;
    }
    let mapped: Vec<Allergen> = entries
        .iter()
        .filter_map(|entry| Allergen::from_label(entry))
        .collect();
    // Every entry must name an allergen, otherwise this is an ingredient
    // list or prose.
    if mapped.len() != entries.len() {
        return None;
    }
    Some((item.to_string(), mapped.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::tests::extracted;

    fn row(record: &ParsedRecord) -> (&str, Vec<Allergen>) {
        match record {
            ParsedRecord::AllergenRow { item, allergens, .. } => (item.as_str(), allergens.to_vec()),
            other => panic!("expected allergen row, got {other:?}"),
        }
    }

    #[test]
    fn parses_pipe_matrix() {
        let text = extracted(&[
            "Pizza | Gluten | Milk | Eggs | Nuts\nMargherita | x | x | - | -\nMarinara | x | - | - | -",
        ]);
        let records = AllergenTableParser.parse(&text);
        assert_eq!(records.len(), 2);
        assert_eq!(row(&records[0]), ("Margherita", vec![Allergen::Gluten, Allergen::Milk]));
        assert_eq!(row(&records[1]), ("Marinara", vec![Allergen::Gluten]));
    }

    #[test]
    fn blank_cells_keep_their_column() {
        let text = extracted(&[
            "| Pizza | Gluten | Milk | Eggs | Nuts |\n| Marinara | | | | x |\n| Calzone | x | x | | |\nFocaccia\tx\t\t\t",
        ]);
        let records = AllergenTableParser.parse(&text);
        assert_eq!(records.len(), 3);
        assert_eq!(row(&records[0]), ("Marinara", vec![Allergen::TreeNuts]));
        assert_eq!(row(&records[1]), ("Calzone", vec![Allergen::Gluten, Allergen::Milk]));
        assert_eq!(row(&records[2]), ("Focaccia", vec![Allergen::Gluten]));
    }

    #[test]
    fn parses_whitespace_matrix_with_multiword_items() {
        let text = extracted(&["Pizza Gluten Lait Oeufs Soja\nQuattro Formaggi oui oui non non\nPizza Vegana oui non non oui"]);
        let records = AllergenTableParser.parse(&text);
        assert_eq!(records.len(), 2);
        assert_eq!(row(&records[0]), ("Quattro Formaggi", vec![Allergen::Gluten, Allergen::Milk]));
        assert_eq!(row(&records[1]), ("Pizza Vegana", vec![Allergen::Gluten, Allergen::Soybeans]));
    }

    #[test]
    fn parses_list_form() {
        let text = extracted(&["Allergens:\nCalzone: gluten, milk and eggs\nMarinara: none\nDough: flour, water, yeast"]);
        let records = AllergenTableParser.parse(&text);
        assert_eq!(records.len(), 2);
        assert_eq!(
            row(&records[0]),
            ("Calzone", vec![Allergen::Gluten, Allergen::Eggs, Allergen::Milk])
        );
        assert_eq!(row(&records[1]), ("Marinara", vec![]));
        // `flour` maps to gluten, but `water` and `yeast` do not name allergens.
        assert!(records.iter().all(|record| row(record).0 != "Dough"));
    }
}
