//! Retrieval and answering.
//!
//! - `VectorStore` / `SqliteVectorStore`: persisted vectors per restaurant
//! - `VectorStoreManager`: embeds and indexes chunks, answers similarity queries
//! - `RagEngine`: question analysis, prompting and the allergen annotation

pub mod annotation;
pub mod context_builder;
pub mod engine;
pub mod manager;
pub mod query;
pub mod retrieval;
pub mod sqlite;
pub mod store;

pub use engine::{QueryResult, RagEngine};
pub use manager::VectorStoreManager;
pub use retrieval::CollectionScope;
pub use sqlite::SqliteVectorStore;
pub use store::{VectorRecord, VectorStore};
