//! Prompt composition.
//!
//! Builds the chat messages sent to the model from:
//! 1. Numbered context blocks with source attribution
//! 2. An allergen instruction block (requested avoidance, allergens per item)
//! 3. The question and the response rules

use serde::Serialize;

use super::annotation::AllergenWarning;
use super::query::QueryAnalysis;
use super::store::SearchHit;
use crate::extract::display_name;
use crate::llm::ChatMessage;

const SYSTEM_ROLE: &str = "You are the assistant of a group of pizzerias. You answer guests' questions about the menus of our restaurants, precisely and helpfully, using only the menu information you are given.";

const RESPONSE_RULES: &str = "RULES:
- Base your answer only on the menu information above. If it is not there, say so clearly.
- Quote prices exactly as written. Never invent a price, an item or an ingredient.
- Name the restaurant of every item you mention.
- Mention the allergens of every item you discuss.
- If the guest asked to avoid allergens, say clearly which items contain them and suggest items without them.
- Never promise that an item is safe; the guest must confirm with restaurant staff.";

/// Excerpt length used in citations and degraded answers.
const EXCERPT_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCitation {
    pub index: usize,
    pub chunk_id: String,
    pub document_id: String,
    pub restaurant: String,
    pub source_file: String,
    pub page: u32,
    pub item: Option<String>,
    pub relevance: f32,
    pub excerpt: String,
}

impl SourceCitation {
    pub fn label(&self) -> String {
        format!("{}, {} p.{}", self.restaurant, self.source_file, self.page)
    }
}

pub fn citations(hits: &[SearchHit]) -> Vec<SourceCitation> {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let metadata = &hit.chunk.metadata;
            SourceCitation {
                index: i + 1,
                chunk_id: hit.chunk.id.clone(),
                document_id: metadata.document_id.clone(),
                restaurant: display_name(&metadata.restaurant),
                source_file: metadata.source_file.clone(),
                page: metadata.page,
                item: metadata.item_name.clone(),
                relevance: hit.score,
                excerpt: excerpt(&hit.chunk.text),
            }
        })
        .collect()
}

fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}…", cut.trim_end())
}

/// Builds the prompt for one question.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    max_context_chars: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            max_context_chars: 6000,
        }
    }
}

impl ContextBuilder {
    pub fn new(max_context_chars: usize) -> Self {
        Self { max_context_chars }
    }

    /// `[n] (Source: …, relevance: …)` blocks, stopping before the context
    /// budget is exceeded. The first block is always kept.
    pub fn format_context(&self, hits: &[SearchHit]) -> String {
        let mut context = String::new();
        let mut current_length = 0;

        for (citation, hit) in citations(hits).iter().zip(hits) {
            let block = format!(
                "[{}] (Source: {}, relevance: {:.2})\n{}\n\n",
                citation.index,
                citation.label(),
                hit.score,
                hit.chunk.text.trim()
            );
            let length = block.chars().count();
            if current_length > 0 && current_length + length > self.max_context_chars {
                break;
            }
            context.push_str(&block);
            current_length += length;
        }

        context.trim().to_string()
    }

    pub fn allergen_block(&self, analysis: &QueryAnalysis, warnings: &[AllergenWarning]) -> String {
        let mut lines = vec!["ALLERGEN INFORMATION:".to_string()];
        if analysis.avoidance.is_empty() {
            lines.push("- The guest did not mention allergens to avoid.".to_string());
        } else {
            lines.push(format!(
                "- The guest asked to avoid: {}. Check every item you mention against this list.",
                analysis.avoidance
            ));
        }

        if warnings.is_empty() {
            lines.push("- No allergens were detected in the menu information.".to_string());
        } else {
            lines.push("- Allergens detected per item:".to_string());
            for warning in warnings {
                let allergens = if warning.allergens.is_empty() {
                    "none detected".to_string()
                } else {
                    warning
                        .allergens
                        .iter()
                        .map(|allergen| allergen.label())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let source = if warning.declared { "allergen table" } else { "from ingredients" };
                lines.push(format!(
                    "  - {} ({}): {} [{}]",
                    warning.item, warning.restaurant, allergens, source
                ));
            }
        }
        lines.join("\n")
    }

    pub fn messages(
        &self,
        question: &str,
        hits: &[SearchHit],
        analysis: &QueryAnalysis,
        warnings: &[AllergenWarning],
    ) -> Vec<ChatMessage> {
        let user = format!(
            "MENU INFORMATION:\n{}\n\n{}\n\nQUESTION: {}\n\n{}",
            self.format_context(hits),
            self.allergen_block(analysis, warnings),
            question.trim(),
            RESPONSE_RULES
        );
        vec![ChatMessage::system(SYSTEM_ROLE), ChatMessage::user(user)]
    }
}
