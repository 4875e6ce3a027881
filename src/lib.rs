//! Question answering over pizzeria menus with allergen annotation.
//!
//! PDFs in the inbound directory are extracted, classified, parsed into
//! records and chunked, then embedded into one vector collection per
//! restaurant. Questions are answered from retrieved chunks by a local
//! model, and every answer carries an allergen annotation.

pub mod allergens;
pub mod chunking;
pub mod commands;
pub mod core;
pub mod extract;
pub mod llm;
pub mod parse;
pub mod pipeline;
pub mod rag;
pub mod server;
pub mod state;
