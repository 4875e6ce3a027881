use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{Document, ExtractionMethod, PageExtractor, PageResults};
use crate::core::errors::RagError;

const RENDERER: &str = "pdftoppm";
const ENGINE: &str = "tesseract";

/// Renders each page with `pdftoppm` and reads it back with `tesseract`.
pub struct OcrExtractor {
    language: String,
    dpi: u32,
    timeout: Duration,
    renderer: Option<PathBuf>,
    engine: Option<PathBuf>,
}

impl OcrExtractor {
    pub fn new(language: String, dpi: u32, timeout: Duration) -> Self {
        let renderer = which::which(RENDERER).ok();
        let engine = which::which(ENGINE).ok();
        if renderer.is_none() || engine.is_none() {
            tracing::warn!(
                "OCR disabled: {} or {} not found on PATH",
                RENDERER,
                ENGINE
            );
        }
        Self {
            language,
            dpi,
            timeout,
            renderer,
            engine,
        }
    }

    async fn run(&self, command: &mut Command) -> Result<Vec<u8>, RagError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| RagError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RagError::Extraction(format!(
                "OCR subprocess exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    async fn ocr_page(
        &self,
        renderer: &Path,
        engine: &Path,
        pdf_path: &Path,
        work_dir: &Path,
        page: u32,
    ) -> Result<String, RagError> {
        let prefix = work_dir.join(format!("page-{}", page));
        let page_arg = page.to_string();

        self.run(
            Command::new(renderer)
                .arg("-r")
                .arg(self.dpi.to_string())
                .arg("-f")
                .arg(&page_arg)
                .arg("-l")
                .arg(&page_arg)
                .arg("-singlefile")
                .arg("-png")
                .arg(pdf_path)
                .arg(&prefix),
        )
        .await?;

        let image = prefix.with_extension("png");
        let stdout = self
            .run(
                Command::new(engine)
                    .arg(&image)
                    .arg("stdout")
                    .arg("-l")
                    .arg(&self.language)
                    .arg("--oem")
                    .arg("3")
                    .arg("--psm")
                    .arg("6"),
            )
            .await?;

        let _ = tokio::fs::remove_file(&image).await;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }
}

#[async_trait]
impl PageExtractor for OcrExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Ocr
    }

    fn is_available(&self) -> bool {
        self.renderer.is_some() && self.engine.is_some()
    }

    async fn page_count(&self, document: &Document) -> Result<u32, RagError> {
        let bytes = document.bytes.clone();
        tokio::task::spawn_blocking(move || {
            let doc = lopdf::Document::load_mem(&bytes).map_err(RagError::extraction)?;
            Ok(doc.get_pages().len() as u32)
        })
        .await
        .map_err(RagError::extraction)?
    }

    async fn extract_pages(
        &self,
        document: &Document,
        pages: &[u32],
    ) -> Result<PageResults, RagError> {
        let (Some(renderer), Some(engine)) = (self.renderer.as_deref(), self.engine.as_deref())
        else {
            return Err(RagError::extraction("OCR executables are not installed"));
        };

        let work_dir = tempfile::tempdir()?;
        let pdf_path = work_dir.path().join("source.pdf");
        tokio::fs::write(&pdf_path, &document.bytes[..]).await?;

        let mut results = Vec::with_capacity(pages.len());
        for page in pages {
            tracing::info!("Running OCR on page {} of {}", page, document.id);
            let text = self
                .ocr_page(renderer, engine, &pdf_path, work_dir.path(), *page)
                .await;
            if let Err(err) = &text {
                tracing::warn!("OCR failed on page {} of {}: {}", page, document.id, err);
            }
            results.push((*page, text));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executables_make_ocr_unavailable() {
        let extractor = OcrExtractor {
            language: "eng".to_string(),
            dpi: 300,
            timeout: Duration::from_secs(1),
            renderer: None,
            engine: None,
        };
        assert!(!extractor.is_available());

        let doc = Document::from_bytes("scan", "rosa", PathBuf::from("scan.pdf"), b"%PDF".to_vec());
        assert!(extractor.extract_pages(&doc, &[1]).await.is_err());
    }
}
