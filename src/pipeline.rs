//! Document processing and question answering.
//!
//! `Pipeline` owns one instance of every stage: extraction, classification,
//! parsing, chunking and indexing, plus the engine answering questions over
//! the result. Processing runs one document at a time and only one run may
//! be active.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::chunking::Chunker;
use crate::core::config::{AppConfig, AppPaths};
use crate::core::errors::RagError;
use crate::extract::{display_name, identify, Document, ExtractionMethod, Extractor};
use crate::parse::{Classifier, DocumentType, ParsedRecord, ParserRegistry};
use crate::rag::store::{CollectionSummary, IndexedDocument};
use crate::rag::{QueryResult, RagEngine, VectorStoreManager};

const ARTIFACT_SUFFIX: &str = "_processed.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSummary {
    pub page: u32,
    pub method: ExtractionMethod,
    pub confidence: f32,
    pub chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub pages: Vec<PageSummary>,
    pub skipped_pages: Vec<u32>,
    pub mean_confidence: f32,
}

/// Written to `<processed_dir>/<document_id>_processed.json` after a
/// document has been indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedArtifact {
    pub run_id: String,
    pub processed_at: DateTime<Utc>,
    pub document_id: String,
    pub restaurant: String,
    pub display_name: String,
    pub source_file: String,
    pub content_hash: String,
    pub document_type: DocumentType,
    pub classification_score: f32,
    pub extraction: ExtractionSummary,
    pub records: Vec<ParsedRecord>,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentOutcome {
    Indexed {
        document_type: DocumentType,
        pages: usize,
        skipped_pages: Vec<u32>,
        records: usize,
        chunks: usize,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub document_id: String,
    pub restaurant: String,
    pub source_file: String,
    #[serde(flatten)]
    pub outcome: DocumentOutcome,
    pub duration_ms: u64,
}

impl DocumentReport {
    pub fn is_indexed(&self) -> bool {
        matches!(self.outcome, DocumentOutcome::Indexed { .. })
    }

    pub fn chunks(&self) -> usize {
        match self.outcome {
            DocumentOutcome::Indexed { chunks, .. } => chunks,
            DocumentOutcome::Failed { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub documents: Vec<DocumentReport>,
    /// Indexed documents whose PDF is no longer in the inbound directory.
    pub removed: Vec<String>,
}

impl ProcessReport {
    pub fn indexed(&self) -> usize {
        self.documents.iter().filter(|report| report.is_indexed()).count()
    }

    pub fn failed(&self) -> usize {
        self.documents.len() - self.indexed()
    }

    pub fn total_chunks(&self) -> usize {
        self.documents.iter().map(DocumentReport::chunks).sum()
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "Processed {} document(s): {} indexed, {} failed, {} chunks.",
            self.documents.len(),
            self.indexed(),
            self.failed(),
            self.total_chunks()
        );
        for report in &self.documents {
            if let DocumentOutcome::Failed { error } = &report.outcome {
                out.push_str(&format!("\n- {} failed: {}", report.source_file, error));
            }
        }
        if !self.removed.is_empty() {
            out.push_str(&format!("\nRemoved from the index: {}", self.removed.join(", ")));
        }
        out
    }
}

/// A PDF in the inbound directory.
#[derive(Debug, Clone, Serialize)]
pub struct InboundDocument {
    pub document_id: String,
    pub restaurant: String,
    pub display_name: String,
    pub source_file: String,
    pub processed: bool,
    pub indexed_chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub model_reachable: bool,
    pub provider: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub processing: bool,
    pub total_chunks: usize,
    pub collections: Vec<CollectionSummary>,
    pub indexed_documents: Vec<IndexedDocument>,
    pub inbound_documents: Vec<InboundDocument>,
}

pub struct Pipeline {
    paths: Arc<AppPaths>,
    extractor: Arc<dyn Extractor>,
    registry: ParserRegistry,
    chunker: Chunker,
    manager: VectorStoreManager,
    engine: RagEngine,
    processing: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        paths: Arc<AppPaths>,
        config: &AppConfig,
        extractor: Arc<dyn Extractor>,
        manager: VectorStoreManager,
    ) -> Self {
        let engine = RagEngine::new(manager.clone(), &config.retrieval, &config.allergens);
        Self {
            paths,
            extractor,
            registry: ParserRegistry::new(),
            chunker: Chunker::new(config.chunking),
            manager,
            engine,
            processing: Mutex::new(()),
        }
    }

    pub fn manager(&self) -> &VectorStoreManager {
        &self.manager
    }

    pub fn is_processing(&self) -> bool {
        self.processing.try_lock().is_err()
    }

    #[cfg(test)]
    pub(crate) async fn hold_processing(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.processing.lock().await
    }

    /// PDFs under the inbound directory, sorted by path.
    pub fn discover(&self) -> Result<Vec<PathBuf>, RagError> {
        let root = &self.paths.documents_dir;
        if !root.is_dir() {
            return Err(RagError::Configuration(format!(
                "documents directory does not exist: {}",
                root.display()
            )));
        }
        let mut found = Vec::new();
        collect_pdfs(root, &mut found)?;
        found.sort();
        Ok(found)
    }

    /// Processes every inbound PDF. Failures are recorded per document and
    /// the run continues.
    pub async fn process_all(&self) -> Result<ProcessReport, RagError> {
        let _guard = self
            .processing
            .try_lock()
            .map_err(|_| RagError::ProcessingInProgress)?;

        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let paths = self.discover()?;
        tracing::info!("Processing run {}: {} document(s)", run_id, paths.len());

        let mut documents = Vec::with_capacity(paths.len());
        let mut seen = HashSet::new();
        for path in &paths {
            let report = self.run_document(&run_id, path).await;
            seen.insert(report.document_id.clone());
            documents.push(report);
        }

        let removed = self.prune(&seen).await?;

        let report = ProcessReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            documents,
            removed,
        };
        tracing::info!(
            "Processing run {} finished: {} indexed, {} failed",
            report.run_id,
            report.indexed(),
            report.failed()
        );
        Ok(report)
    }

    /// Processes a single PDF, given relative to the inbound directory or
    /// as a path inside it.
    pub async fn process_document(&self, path: &Path) -> Result<DocumentReport, RagError> {
        let _guard = self
            .processing
            .try_lock()
            .map_err(|_| RagError::ProcessingInProgress)?;

        let resolved = self.resolve_document(path).await?;
        let run_id = Uuid::new_v4().to_string();
        let report = self.run_document(&run_id, &resolved).await;
        match &report.outcome {
            DocumentOutcome::Indexed { .. } => Ok(report),
            DocumentOutcome::Failed { error } => Err(RagError::Extraction(format!(
                "{}: {}",
                report.source_file, error
            ))),
        }
    }

    /// Resolves `path` to a PDF inside the documents directory. Symlinks and
    /// `..` components are resolved before the containment check.
    async fn resolve_document(&self, path: &Path) -> Result<PathBuf, RagError> {
        let root = &self.paths.documents_dir;
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        let canonical_root = tokio::fs::canonicalize(root).await?;
        let canonical = tokio::fs::canonicalize(&candidate).await.map_err(|_| {
            RagError::Configuration(format!("no such document: {}", path.display()))
        })?;
        let relative = canonical.strip_prefix(&canonical_root).map_err(|_| {
            RagError::Configuration(format!(
                "{} is outside the documents directory {}",
                path.display(),
                root.display()
            ))
        })?;
        if !is_pdf(&canonical) || !canonical.is_file() {
            return Err(RagError::Configuration(format!(
                "{} is not a PDF document",
                path.display()
            )));
        }
        Ok(root.join(relative))
    }

    async fn run_document(&self, run_id: &str, path: &Path) -> DocumentReport {
        let started = Instant::now();
        let relative = path.strip_prefix(&self.paths.documents_dir).unwrap_or(path);
        let (document_id, restaurant) = identify(relative);
        let source_file = relative.to_string_lossy().into_owned();

        let outcome = match self.index_path(run_id, path).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("Failed to process {}: {}", source_file, err);
                DocumentOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };

        DocumentReport {
            document_id,
            restaurant,
            source_file,
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn index_path(&self, run_id: &str, path: &Path) -> Result<DocumentOutcome, RagError> {
        let document = Document::load(&self.paths.documents_dir, path)?;
        let extracted = self.extractor.extract(&document).await?;
        if extracted.pages.is_empty() {
            return Err(RagError::Extraction(format!(
                "no readable text in {}",
                document.file_name()
            )));
        }

        let classification = Classifier::classify(&extracted);
        let records = self.registry.parse(classification.document_type, &extracted);
        let chunks = self.chunker.chunk(&document, classification.document_type, &records);
        if chunks.is_empty() {
            return Err(RagError::Extraction(format!(
                "nothing to index in {}",
                document.file_name()
            )));
        }

        let indexed = self.manager.index(&document.id, &chunks).await?;
        tracing::info!(
            "Indexed {} as {} ({} records, {} chunks)",
            document.id,
            classification.document_type,
            records.len(),
            indexed
        );

        let artifact = ProcessedArtifact {
            run_id: run_id.to_string(),
            processed_at: Utc::now(),
            document_id: document.id.clone(),
            restaurant: document.restaurant.clone(),
            display_name: document.display_name.clone(),
            source_file: document.file_name(),
            content_hash: document.content_hash.clone(),
            document_type: classification.document_type,
            classification_score: classification.score,
            extraction: ExtractionSummary {
                pages: extracted
                    .pages
                    .iter()
                    .map(|page| PageSummary {
                        page: page.page_number,
                        method: page.method,
                        confidence: page.confidence,
                        chars: page.text.chars().count(),
                    })
                    .collect(),
                skipped_pages: extracted.skipped_pages.clone(),
                mean_confidence: extracted.mean_confidence(),
            },
            records,
            chunk_count: indexed,
        };
        self.write_artifact(&artifact).await?;

        Ok(DocumentOutcome::Indexed {
            document_type: artifact.document_type,
            pages: artifact.extraction.pages.len(),
            skipped_pages: artifact.extraction.skipped_pages,
            records: artifact.records.len(),
            chunks: indexed,
        })
    }

    pub fn artifact_path(&self, document_id: &str) -> PathBuf {
        self.paths
            .processed_dir
            .join(format!("{}{}", document_id, ARTIFACT_SUFFIX))
    }

    async fn write_artifact(&self, artifact: &ProcessedArtifact) -> Result<(), RagError> {
        tokio::fs::create_dir_all(&self.paths.processed_dir).await?;
        let body = serde_json::to_vec_pretty(artifact)
            .map_err(|e| RagError::Io(std::io::Error::other(e)))?;
        tokio::fs::write(self.artifact_path(&artifact.document_id), body).await?;
        Ok(())
    }

    pub async fn read_artifact(&self, document_id: &str) -> Result<ProcessedArtifact, RagError> {
        let raw = tokio::fs::read(self.artifact_path(document_id)).await?;
        serde_json::from_slice(&raw).map_err(|e| RagError::Io(std::io::Error::other(e)))
    }

    async fn prune(&self, seen: &HashSet<String>) -> Result<Vec<String>, RagError> {
        let mut removed = Vec::new();
        for indexed in self.manager.store().documents().await? {
            if seen.contains(&indexed.document_id) {
                continue;
            }
            self.manager.store().delete_document(&indexed.document_id).await?;
            let artifact = self.artifact_path(&indexed.document_id);
            if artifact.exists() {
                tokio::fs::remove_file(&artifact).await?;
            }
            tracing::info!("Removed {} from the index: source is gone", indexed.document_id);
            removed.push(indexed.document_id);
        }
        Ok(removed)
    }

    pub async fn answer(&self, question: &str) -> QueryResult {
        self.engine.answer(question).await
    }

    pub async fn documents(&self) -> Result<Vec<InboundDocument>, RagError> {
        let indexed = self.manager.store().documents().await?;
        let mut out = Vec::new();
        for path in self.discover()? {
            let relative = path.strip_prefix(&self.paths.documents_dir).unwrap_or(&path);
            let (document_id, restaurant) = identify(relative);
            let indexed_chunks = indexed
                .iter()
                .find(|doc| doc.document_id == document_id)
                .map(|doc| doc.chunk_count)
                .unwrap_or(0);
            out.push(InboundDocument {
                processed: self.artifact_path(&document_id).is_file(),
                display_name: display_name(&restaurant),
                source_file: relative.to_string_lossy().into_owned(),
                document_id,
                restaurant,
                indexed_chunks,
            });
        }
        Ok(out)
    }

    pub async fn status(&self) -> Result<SystemStatus, RagError> {
        let llm = self.manager.llm();
        let store = self.manager.store();
        Ok(SystemStatus {
            model_reachable: llm.health_check().await,
            provider: llm.provider_name().to_string(),
            chat_model: llm.chat_model().to_string(),
            embedding_model: llm.embedding_model().to_string(),
            processing: self.is_processing(),
            total_chunks: store.count(None).await?,
            collections: store.collections().await?,
            indexed_documents: store.documents().await?,
            inbound_documents: self.documents().await?,
        })
    }
}

fn collect_pdfs(dir: &Path, found: &mut Vec<PathBuf>) -> Result<(), RagError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            collect_pdfs(&path, found)?;
        } else if is_pdf(&path) {
            found.push(path);
        }
    }
    Ok(())
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
