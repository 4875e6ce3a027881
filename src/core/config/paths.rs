use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::PathsConfig;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    /// Inbound PDFs; one sub-directory per restaurant or one file per restaurant.
    pub documents_dir: PathBuf,
    /// One `<document>_processed.json` artifact per source document.
    pub processed_dir: PathBuf,
    pub data_dir: PathBuf,
    pub vector_db_path: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        Self::with_root(discover_project_root())
    }

    pub fn with_root(project_root: PathBuf) -> Self {
        let data_dir = project_root.join("data");
        AppPaths {
            documents_dir: project_root.join("docs").join("raw_pdfs"),
            processed_dir: data_dir.join("processed"),
            vector_db_path: data_dir.join("vector_store.db"),
            log_dir: project_root.join("logs"),
            data_dir,
            project_root,
        }
    }

    /// Applies `paths.*` overrides from the config file. Relative entries
    /// are resolved against the project root.
    pub fn apply_overrides(mut self, overrides: &PathsConfig) -> Self {
        if let Some(dir) = overrides.documents_dir.as_deref() {
            self.documents_dir = resolve(&self.project_root, dir);
        }
        if let Some(dir) = overrides.processed_dir.as_deref() {
            self.processed_dir = resolve(&self.project_root, dir);
        }
        if let Some(dir) = overrides.data_dir.as_deref() {
            self.data_dir = resolve(&self.project_root, dir);
            self.vector_db_path = self.data_dir.join("vector_store.db");
        }
        self
    }

    /// Creates the writable directories. The documents directory is left
    /// alone: its absence is a startup error the operator must fix.
    pub fn ensure_writable_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.processed_dir, &self.data_dir, &self.log_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(root: &Path, raw: &str) -> PathBuf {
    let candidate = PathBuf::from(raw);
    if candidate.is_absolute() {
        candidate
    } else {
        root.join(candidate)
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("PIZZERIA_ROOT") {
        return PathBuf::from(root);
    }

    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if cwd.join("config.yml").exists() {
        return cwd;
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.yml").exists() {
        return manifest_dir;
    }

    cwd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_resolve_relative_to_root() {
        let paths = AppPaths::with_root(PathBuf::from("/srv/pizza")).apply_overrides(&PathsConfig {
            documents_dir: Some("menus".to_string()),
            processed_dir: None,
            data_dir: Some("/var/lib/pizza".to_string()),
        });

        assert_eq!(paths.documents_dir, PathBuf::from("/srv/pizza/menus"));
        assert_eq!(paths.processed_dir, PathBuf::from("/srv/pizza/data/processed"));
        assert_eq!(paths.vector_db_path, PathBuf::from("/var/lib/pizza/vector_store.db"));
    }
}
