//! Turning files on disk into [`SourceDocument`]s.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ragchat_rag::{DocumentMetadata, Page, SourceDocument};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{ChatError, Result};

/// Page separator in text extracted from paginated formats.
const FORM_FEED: char = '\u{0C}';

/// The ingestion seam: produce documents from a file or directory.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load one file, or every supported file under a directory.
    ///
    /// Files that fail to load are logged and skipped; an empty result is
    /// not an error here.
    async fn load_path(&self, path: &Path) -> Result<Vec<SourceDocument>>;
}

/// Loads UTF-8 text files, one page per form-feed separated section.
///
/// Blank pages are skipped but keep their place in the numbering, so page
/// numbers match the source. Files that are not valid UTF-8 or contain no
/// text are rejected.
#[derive(Debug, Clone)]
pub struct PlainTextLoader {
    extensions: Vec<String>,
}

impl PlainTextLoader {
    /// Accept files whose extension (with leading dot, any case) is listed.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(|e| e.into().to_lowercase()).collect(),
        }
    }

    fn is_supported(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// Load a single file.
    pub fn load_file(&self, path: &Path) -> Result<SourceDocument> {
        let fail = |message: String| ChatError::Ingestion { path: path.to_path_buf(), message };

        let bytes = std::fs::read(path).map_err(|e| fail(e.to_string()))?;
        let file_size = bytes.len() as u64;
        let text = String::from_utf8(bytes).map_err(|e| fail(format!("not valid UTF-8: {e}")))?;

        let sections: Vec<&str> = text.split(FORM_FEED).collect();
        let page_count = sections.len();
        let pages: Vec<Page> = sections
            .iter()
            .enumerate()
            .filter(|(_, section)| !section.trim().is_empty())
            .map(|(i, section)| Page::new(i as u32 + 1, section.trim()))
            .collect();
        if pages.is_empty() {
            return Err(fail("no text content".to_string()));
        }

        let content = pages.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join("\n");
        let metadata = DocumentMetadata {
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_path: path.display().to_string(),
            file_type: extension_of(path).unwrap_or_default(),
            file_size,
            page_count,
        };
        Ok(SourceDocument { content, pages, metadata })
    }

    fn load_blocking(&self, path: &Path) -> Result<Vec<SourceDocument>> {
        if !path.exists() {
            return Err(ChatError::EmptyInput(format!("{} does not exist", path.display())));
        }
        if path.is_file() {
            return Ok(vec![self.load_file(path)?]);
        }

        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|file| self.is_supported(file))
            .collect();
        files.sort();
        info!(directory = %path.display(), file_count = files.len(), "found documents");

        let mut documents = Vec::with_capacity(files.len());
        for file in &files {
            match self.load_file(file) {
                Ok(document) => {
                    info!(
                        filename = %document.metadata.filename,
                        page_count = document.pages.len(),
                        "loaded document"
                    );
                    documents.push(document);
                }
                Err(e) => warn!(error = %e, "skipping document"),
            }
        }
        Ok(documents)
    }
}

impl Default for PlainTextLoader {
    fn default() -> Self {
        Self::new([".txt", ".md"])
    }
}

#[async_trait]
impl DocumentLoader for PlainTextLoader {
    async fn load_path(&self, path: &Path) -> Result<Vec<SourceDocument>> {
        let loader = self.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || loader.load_blocking(&path))
            .await
            .map_err(|e| ChatError::ExternalService(format!("loader task failed: {e}")))?
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}
