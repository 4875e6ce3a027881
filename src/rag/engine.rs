//! Question answering over the indexed menus.
//!
//! Stateless per query: analyse the question, retrieve, profile the items
//! found, prompt the model and append the allergen annotation. Model
//! failures degrade the answer to excerpts; they never fail the query.

use serde::Serialize;

use super::annotation::{build_item_profiles, AllergenWarning, Annotator};
use super::context_builder::{citations, ContextBuilder, SourceCitation};
use super::manager::VectorStoreManager;
use super::query::{QueryAnalysis, QueryAnalyzer};
use super::retrieval::CollectionScope;
use super::store::SearchHit;
use crate::allergens::Allergen;
use crate::core::config::{AllergenConfig, RetrievalConfig};
use crate::core::errors::RagError;
use crate::extract::display_name;

pub const NO_INFORMATION: &str = "No matching information found in the indexed menus";

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub allergen_warnings: Vec<AllergenWarning>,
    pub avoidance: Vec<Allergen>,
    pub restaurants_searched: Vec<String>,
    pub has_context: bool,
    /// The model could not be used; the answer holds excerpts only.
    pub degraded: bool,
}

pub struct RagEngine {
    manager: VectorStoreManager,
    top_k: usize,
    annotator: Annotator,
    context: ContextBuilder,
}

impl RagEngine {
    pub fn new(manager: VectorStoreManager, retrieval: &RetrievalConfig, allergens: &AllergenConfig) -> Self {
        Self {
            manager,
            top_k: retrieval.top_k,
            annotator: Annotator::new(allergens.confidence_threshold),
            context: ContextBuilder::default(),
        }
    }

    pub async fn answer(&self, question: &str) -> QueryResult {
        let known = match self.manager.store().collections().await {
            Ok(collections) => collections.into_iter().map(|summary| summary.name).collect(),
            Err(err) => {
                tracing::warn!("Could not list collections: {}", err);
                Vec::new()
            }
        };
        let analysis = QueryAnalyzer::new(known.clone()).analyze(question);
        let restaurants_searched = match &analysis.scope {
            CollectionScope::All => known,
            CollectionScope::Only(names) => names.clone(),
        };

        let hits = match self.manager.query(question, &analysis.scope, self.top_k).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!("Retrieval failed, answering without context: {}", err);
                let answer = format!(
                    "The menu index cannot be searched right now ({}). Please try again in a moment.",
                    err
                );
                return self.finish(question, answer, &[], &analysis, restaurants_searched, true);
            }
        };

        if hits.is_empty() {
            let scope = if analysis.restaurants.is_empty() {
                String::new()
            } else {
                format!(
                    " for {}",
                    analysis
                        .restaurants
                        .iter()
                        .map(|slug| display_name(slug))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            };
            let answer = format!(
                "{}{}. I can only answer from the menus that have been processed.",
                NO_INFORMATION, scope
            );
            return self.finish(question, answer, &hits, &analysis, restaurants_searched, false);
        }

        let warnings = self.warnings(&hits, &analysis);
        let messages = self.context.messages(question, &hits, &analysis, &warnings);

        let (answer, degraded) = match self.manager.llm().chat(messages).await {
            Ok(answer) => (answer.trim().to_string(), false),
            Err(err) => {
                tracing::warn!("Generation failed, returning excerpts: {}", err);
                (degraded_answer(&err, &hits), true)
            }
        };
        self.finish(question, answer, &hits, &analysis, restaurants_searched, degraded)
    }

    fn warnings(&self, hits: &[SearchHit], analysis: &QueryAnalysis) -> Vec<AllergenWarning> {
        let profiles = build_item_profiles(hits);
        self.annotator.warnings(&profiles, &analysis.avoidance)
    }

    fn finish(
        &self,
        question: &str,
        answer: String,
        hits: &[SearchHit],
        analysis: &QueryAnalysis,
        restaurants_searched: Vec<String>,
        degraded: bool,
    ) -> QueryResult {
        let warnings = self.warnings(hits, analysis);
        let annotation = self.annotator.render(&warnings, &analysis.avoidance);

        QueryResult {
            question: question.to_string(),
            answer: format!("{}\n\n{}", answer, annotation),
            sources: citations(hits),
            allergen_warnings: warnings,
            avoidance: analysis.avoidance.to_vec(),
            restaurants_searched,
            has_context: !hits.is_empty(),
            degraded,
        }
    }
}

fn degraded_answer(err: &RagError, hits: &[SearchHit]) -> String {
    let reason = match err {
        RagError::Timeout(_) => "took too long to respond",
        _ => "is unavailable",
    };
    let mut answer = format!(
        "The language model {} right now, so here are the most relevant excerpts from the menus:",
        reason
    );
    for citation in citations(hits) {
        answer.push_str(&format!(
            "\n\n[{}] ({})\n{}",
            citation.index,
            citation.label(),
            citation.excerpt
        ));
    }
    answer
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;
    use crate::chunking::Chunk;
    use crate::core::config::AppConfig;
    use crate::llm::tests::{ChatBehaviour, FakeProvider};
    use crate::rag::manager::tests::manager;
    use crate::rag::sqlite::tests::make_chunk;

    fn margherita() -> Chunk {
        let mut chunk = make_chunk("anchor_pizza__menu", "anchor_pizza", 0, "");
        chunk.text = "Restaurant: Anchor Pizza | Item: Margherita | Price: $10 | Type: menu\nIngredients: tomato, mozzarella, basil".to_string();
        chunk.metadata.item_name = Some("Margherita".to_string());
        chunk.metadata.ingredients = vec!["tomato".into(), "mozzarella".into(), "basil".into()];
        chunk
    }

    async fn engine(dir: &tempfile::TempDir, provider: Arc<FakeProvider>) -> RagEngine {
        let manager = manager(dir, provider).await;
        manager.index("anchor_pizza__menu", &[margherita()]).await.unwrap();
        let config = AppConfig::builtin().unwrap();
        RagEngine::new(manager, &config.retrieval, &config.allergens)
    }

    #[tokio::test]
    async fn answer_carries_price_and_milk_warning() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::replying("The Margherita at Anchor Pizza costs $10."));
        let engine = engine(&dir, provider.clone()).await;

        let result = engine.answer("What's the price of the Margherita?").await;
        assert!(!result.degraded);
        assert!(result.answer.contains("$10"));
        assert!(result.answer.contains("- Margherita (Anchor Pizza): milk"));
        assert_eq!(result.allergen_warnings[0].allergens, [Allergen::Milk]);
        assert_eq!(result.sources[0].restaurant, "Anchor Pizza");

        let prompt = provider.last_prompt().unwrap();
        assert!(prompt[1].content.contains("Price: $10"));
    }

    #[tokio::test]
    async fn annotation_is_added_without_allergen_question() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir, Arc::new(FakeProvider::replying("We have a Margherita."))).await;
        let result = engine.answer("Tell me about the Margherita").await;
        assert!(result.answer.contains("Allergen information:"));
        assert!(result.answer.contains("milk"));
    }

    #[tokio::test]
    async fn unknown_restaurant_yields_no_information() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::replying("The Margherita costs $12."));
        let engine = engine(&dir, provider.clone()).await;

        let result = engine.answer("How much is the Margherita at Luigi's?").await;
        assert!(result.answer.starts_with(NO_INFORMATION));
        assert!(!result.answer.contains('$'));
        assert!(result.sources.is_empty());
        assert!(!result.has_context);
        assert_eq!(provider.chat_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_failure_degrades_to_excerpts() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir, Arc::new(FakeProvider::new(ChatBehaviour::Fail))).await;
        let result = engine.answer("What's the price of the Margherita?").await;
        assert!(result.degraded);
        assert!(result.answer.contains("Price: $10"));
        assert!(result.answer.contains("- Margherita (Anchor Pizza): milk"));
    }

    #[tokio::test]
    async fn model_timeout_degrades_to_excerpts() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir, Arc::new(FakeProvider::new(ChatBehaviour::Hang))).await;
        let result = engine.answer("Margherita price?").await;
        assert!(result.degraded);
        assert!(result.answer.contains("took too long"));
    }

    #[tokio::test]
    async fn embedding_outage_degrades_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::replying("unused"));
        let engine = engine(&dir, provider.clone()).await;
        provider.embed_fails.store(true, Ordering::SeqCst);

        let result = engine.answer("Margherita price?").await;
        assert!(result.degraded);
        assert!(result.answer.contains("Allergen information:"));
    }

    #[tokio::test]
    async fn avoidance_conflicts_are_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir, Arc::new(FakeProvider::replying("Try the Margherita."))).await;
        let result = engine.answer("I'm lactose intolerant, can I have the Margherita?").await;
        assert_eq!(result.avoidance, [Allergen::Milk]);
        assert_eq!(result.allergen_warnings[0].conflicts, [Allergen::Milk]);
        assert!(result.answer.contains("WARNING: contains milk"));
    }
}
