use super::{ParsedRecord, RecordParser};
use crate::extract::ExtractedText;

/// Paragraphs shorter than this are merged into the next one.
const MIN_PASSAGE_CHARS: usize = 40;

/// Generic paragraphs, used for unclassified documents.
pub struct PassageParser;

impl RecordParser for PassageParser {
    fn parse(&self, extracted: &ExtractedText) -> Vec<ParsedRecord> {
        let mut records = Vec::new();
        for page in &extracted.pages {
            let mut pending = String::new();
            for paragraph in paragraphs(&page.text) {
                if !pending.is_empty() {
                    pending.push('\n');
                }
                pending.push_str(&paragraph);
                if pending.chars().count() >= MIN_PASSAGE_CHARS {
                    records.push(ParsedRecord::Passage {
                        text: std::mem::take(&mut pending),
                        page: page.page_number,
                    });
                }
            }
            if !pending.trim().is_empty() {
                // A short tail joins the previous passage of the same page.
                match records.last_mut() {
                    Some(ParsedRecord::Passage {
                        text,
                        page: last_page,
                    }) if *last_page == page.page_number => {
                        text.push('\n');
                        text.push_str(&pending);
                    }
                    _ => records.push(ParsedRecord::Passage {
                        text: pending,
                        page: page.page_number,
                    }),
                }
            }
        }
        records
    }
}

fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                out.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join(" "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::tests::extracted;

    #[test]
    fn splits_pages_into_paragraphs() {
        let text = extracted(&[
            "Our story began in Naples in 1952 with a single wood-fired oven.\n\nToday we still knead every dough by hand each morning.",
            "Open daily.",
        ]);
        let records = PassageParser.parse(&text);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].page(), 1);
        assert_eq!(records[1].page(), 1);
        assert!(matches!(&records[2], ParsedRecord::Passage { text, page: 2 } if text == "Open daily."));
    }

    #[test]
    fn short_paragraphs_are_merged() {
        let text = extracted(&["Hours\n\nMonday to Friday, noon to eleven in the evening."]);
        let records = PassageParser.parse(&text);
        assert_eq!(records.len(), 1);
        assert!(matches!(&records[0], ParsedRecord::Passage { text, .. } if text.starts_with("Hours\n")));
    }
}
