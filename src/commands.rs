//! Chat messages starting with `/` are system commands, answered without
//! the model.

use crate::pipeline::{InboundDocument, Pipeline, SystemStatus};

pub const HELP_TEXT: &str = "Ask anything about the processed menus, for example \"What pizzas does Anchor Pizza have?\" or \"Which pizzas have no milk?\".\n\nCommands:\n/status - model and index status\n/documents - inbound documents and their processing state\n/process - process every inbound document\n/help - this message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemCommand {
    Status,
    Documents,
    Process,
    Help,
    Unknown(String),
}

impl SystemCommand {
    /// `None` when the message is a question.
    pub fn parse(message: &str) -> Option<Self> {
        let trimmed = message.trim();
        let name = trimmed.strip_prefix('/')?;
        let name = name.split_whitespace().next().unwrap_or_default().to_lowercase();
        Some(match name.as_str() {
            "status" => SystemCommand::Status,
            "documents" | "docs" => SystemCommand::Documents,
            "process" => SystemCommand::Process,
            "help" | "" => SystemCommand::Help,
            _ => SystemCommand::Unknown(trimmed.to_string()),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            SystemCommand::Status => "status",
            SystemCommand::Documents => "documents",
            SystemCommand::Process => "process",
            SystemCommand::Help => "help",
            SystemCommand::Unknown(_) => "unknown",
        }
    }

    /// Runs the command and renders its reply. Failures are reported in
    /// the reply text.
    pub async fn execute(&self, pipeline: &Pipeline) -> String {
        match self {
            SystemCommand::Status => match pipeline.status().await {
                Ok(status) => render_status(&status),
                Err(err) => format!("Status unavailable: {}", err),
            },
            SystemCommand::Documents => match pipeline.documents().await {
                Ok(documents) => render_documents(&documents),
                Err(err) => format!("Cannot list documents: {}", err),
            },
            SystemCommand::Process => match pipeline.process_all().await {
                Ok(report) => report.summary(),
                Err(err) => format!("Processing not started: {}", err),
            },
            SystemCommand::Help => HELP_TEXT.to_string(),
            SystemCommand::Unknown(raw) => format!("Unknown command {}.\n\n{}", raw, HELP_TEXT),
        }
    }
}

pub fn render_status(status: &SystemStatus) -> String {
    let mut out = format!(
        "Model server ({}): {}\nChat model: {}\nEmbedding model: {}\nIndexed chunks: {}",
        status.provider,
        if status.model_reachable { "reachable" } else { "unreachable" },
        status.chat_model,
        status.embedding_model,
        status.total_chunks
    );
    if status.processing {
        out.push_str("\nProcessing is running.");
    }
    if status.collections.is_empty() {
        out.push_str("\nNo restaurants indexed yet. Run /process.");
    } else {
        out.push_str("\nRestaurants:");
        for collection in &status.collections {
            out.push_str(&format!("\n- {} ({} chunks)", collection.name, collection.count));
        }
    }
    let pending = status
        .inbound_documents
        .iter()
        .filter(|document| !document.processed)
        .count();
    if pending > 0 {
        out.push_str(&format!("\n{} inbound document(s) not processed yet.", pending));
    }
    out
}

pub fn render_documents(documents: &[InboundDocument]) -> String {
    if documents.is_empty() {
        return "No PDF documents in the inbound directory.".to_string();
    }
    let mut out = format!("{} document(s):", documents.len());
    for document in documents {
        let state = if document.processed && document.indexed_chunks > 0 {
            format!("indexed, {} chunks", document.indexed_chunks)
        } else if document.processed {
            "processed, not indexed".to_string()
        } else {
            "not processed".to_string()
        };
        out.push_str(&format!(
            "\n- {} [{}]: {}",
            document.source_file, document.display_name, state
        ));
    }
    out
}
