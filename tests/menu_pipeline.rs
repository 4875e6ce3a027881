//! Processes a small inbound directory end to end and answers questions
//! against a fake model server.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use pizzeria_rag::allergens::Allergen;
use pizzeria_rag::core::config::{AppConfig, AppPaths};
use pizzeria_rag::core::errors::RagError;
use pizzeria_rag::extract::{Document, ExtractedPage, ExtractedText, ExtractionMethod, Extractor};
use pizzeria_rag::llm::{ChatRequest, LlmProvider, LlmService, ProviderModel};
use pizzeria_rag::pipeline::Pipeline;
use pizzeria_rag::rag::engine::NO_INFORMATION;
use pizzeria_rag::rag::{SqliteVectorStore, VectorStore, VectorStoreManager};

const DIMENSION: usize = 32;

struct EchoModel {
    reply: String,
    chat_calls: AtomicUsize,
}

fn embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSION];
    for word in text
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| word.len() > 2)
    {
        let slot = word.bytes().fold(7usize, |acc, byte| acc.wrapping_mul(31).wrapping_add(byte as usize));
        vector[slot % DIMENSION] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt().max(1e-6);
    vector.iter().map(|v| v / norm).collect()
}

#[async_trait]
impl LlmProvider for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        Ok(true)
    }

    async fn list_models(&self) -> Result<Vec<ProviderModel>, RagError> {
        Ok(Vec::new())
    }

    async fn chat(&self, _request: ChatRequest, _model_id: &str) -> Result<String, RagError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(inputs.iter().map(|input| embedding(input)).collect())
    }
}

/// The test documents are plain text with a `.pdf` name.
struct TextExtractor;

#[async_trait]
impl Extractor for TextExtractor {
    async fn extract(&self, document: &Document) -> Result<ExtractedText, RagError> {
        let text = String::from_utf8_lossy(&document.bytes).into_owned();
        Ok(ExtractedText {
            document_id: document.id.clone(),
            pages: vec![ExtractedPage {
                page_number: 1,
                text,
                method: ExtractionMethod::TextLayer,
                confidence: 0.9,
            }],
            skipped_pages: Vec::new(),
        })
    }
}

fn write(root: &Path, relative: &str, text: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

async fn open_pipeline(root: &Path, model: Arc<EchoModel>) -> Pipeline {
    let paths = Arc::new(AppPaths::with_root(root.to_path_buf()));
    paths.ensure_writable_dirs().unwrap();
    let config = AppConfig::builtin().unwrap();
    let llm = LlmService::new(model, config.llm.clone());
    let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::new(&paths).await.unwrap());
    let manager = VectorStoreManager::open(store, llm).await.unwrap();
    Pipeline::new(paths, &config, Arc::new(TextExtractor), manager)
}

fn seed(root: &Path) {
    let inbound = root.join("docs").join("raw_pdfs");
    write(
        &inbound,
        "anchor_pizza/menu.pdf",
        "Our pizzas\nMargherita - tomato, mozzarella, basil $10\nMarinara - tomato, garlic, oregano $8",
    );
    write(
        &inbound,
        "marco/allergens.pdf",
        "Allergen information\nPizza | Gluten | Milk | Eggs | Nuts\nDiavola | x | x | - | -\nVegana | x | - | - | -",
    );
}

#[tokio::test]
async fn answers_from_processed_menus() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let model = Arc::new(EchoModel {
        reply: "The Margherita at Anchor Pizza costs $10.".to_string(),
        chat_calls: AtomicUsize::new(0),
    });
    let pipeline = open_pipeline(dir.path(), model.clone()).await;

    let report = pipeline.process_all().await.unwrap();
    assert_eq!(report.indexed(), 2, "{}", report.summary());
    assert!(dir
        .path()
        .join("data/processed/anchor_pizza__menu_processed.json")
        .is_file());

    let result = pipeline.answer("How much is the Margherita at Anchor Pizza?").await;
    assert!(result.answer.starts_with("The Margherita at Anchor Pizza costs $10."));
    assert!(result.answer.contains("Allergen information:"));
    assert_eq!(result.restaurants_searched, ["anchor_pizza"]);
    assert!(result.sources.iter().all(|source| source.restaurant == "Anchor Pizza"));
    let margherita = result
        .allergen_warnings
        .iter()
        .find(|warning| warning.item == "Margherita")
        .unwrap();
    assert!(margherita.allergens.contains(&Allergen::Milk));
}

#[tokio::test]
async fn declared_allergens_conflict_with_avoidance() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let model = Arc::new(EchoModel {
        reply: "The Vegana has no milk.".to_string(),
        chat_calls: AtomicUsize::new(0),
    });
    let pipeline = open_pipeline(dir.path(), model).await;
    pipeline.process_all().await.unwrap();

    let result = pipeline.answer("Which pizza at Marco has no milk?").await;
    assert_eq!(result.avoidance, [Allergen::Milk]);
    let diavola = result
        .allergen_warnings
        .iter()
        .find(|warning| warning.item == "Diavola")
        .unwrap();
    assert!(diavola.declared);
    assert_eq!(diavola.conflicts, [Allergen::Milk]);
    assert!(result.answer.contains("WARNING: contains milk"));
}

#[tokio::test]
async fn unknown_restaurant_skips_the_model() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let model = Arc::new(EchoModel {
        reply: "It costs $12.".to_string(),
        chat_calls: AtomicUsize::new(0),
    });
    let pipeline = open_pipeline(dir.path(), model.clone()).await;
    pipeline.process_all().await.unwrap();

    let result = pipeline.answer("How much is the Calzone at Luigi's?").await;
    assert!(result.answer.starts_with(NO_INFORMATION));
    assert!(!result.has_context);
    assert_eq!(model.chat_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn index_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());
    let model = Arc::new(EchoModel {
        reply: "ok".to_string(),
        chat_calls: AtomicUsize::new(0),
    });

    let pipeline = open_pipeline(dir.path(), model.clone()).await;
    let report = pipeline.process_all().await.unwrap();
    pipeline.manager().close().await;
    drop(pipeline);

    let reopened = open_pipeline(dir.path(), model).await;
    let status = reopened.status().await.unwrap();
    assert_eq!(status.total_chunks, report.total_chunks());
    assert_eq!(status.collections.len(), 2);
    assert!(status.inbound_documents.iter().all(|document| document.processed));
}
