//! Data types for pages, chunks, and retrieval results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata keys used when a [`ChunkMetadata`] is flattened for the index.
pub mod keys {
    pub const FILENAME: &str = "filename";
    pub const PAGE_NUMBER: &str = "page_number";
    pub const SECTION: &str = "section";
    pub const CHAPTER: &str = "chapter";
    pub const REFERENCE: &str = "reference";
    pub const LOCAL_CHUNK_ID: &str = "chunk_id";
    pub const GLOBAL_CHUNK_ID: &str = "global_chunk_id";
    pub const CHUNK_SIZE: &str = "chunk_size";

    pub(crate) const KNOWN: [&str; 8] = [
        FILENAME,
        PAGE_NUMBER,
        SECTION,
        CHAPTER,
        REFERENCE,
        LOCAL_CHUNK_ID,
        GLOBAL_CHUNK_ID,
        CHUNK_SIZE,
    ];
}

/// Structural annotations supplied by the ingestion collaborator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageFlags {
    /// The page contained at least one detected table.
    pub has_tables: bool,
    /// The page contained at least one image.
    pub has_images: bool,
    /// Text on this page came from OCR rather than an embedded text layer.
    pub ocr_applied: bool,
}

/// A single page of an ingested document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    /// 1-based page number.
    pub page_number: u32,
    /// Raw page text.
    pub text: String,
    /// Structural annotations.
    #[serde(default)]
    pub flags: PageFlags,
}

impl Page {
    /// Create a page with no structural annotations.
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self { page_number, text: text.into(), flags: PageFlags::default() }
    }
}

/// File-level metadata produced by the ingestion collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    pub filename: String,
    pub file_path: String,
    pub file_type: String,
    pub file_size: u64,
    pub page_count: usize,
}

/// An ingested document: full text, its pages, and file metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDocument {
    /// The concatenated text of all pages.
    pub content: String,
    /// Pages in reading order.
    pub pages: Vec<Page>,
    /// File-level metadata.
    pub metadata: DocumentMetadata,
}

/// Metadata attached to every [`Chunk`].
///
/// Known fields are typed; ingestion-specific annotations go in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Sequential id within one chunking call (0-based).
    #[serde(default)]
    pub local_chunk_id: usize,
    /// Id unique across one load run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_chunk_id: Option<usize>,
    /// Length of the chunk content in characters.
    #[serde(default)]
    pub chunk_size: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ChunkMetadata {
    /// Base metadata for chunks cut from `page` of the document described by `document`.
    pub fn for_page(document: &DocumentMetadata, page: &Page) -> Self {
        let mut extra = BTreeMap::new();
        extra.insert("file_path".to_string(), document.file_path.clone());
        extra.insert("file_type".to_string(), document.file_type.clone());
        extra.insert("file_size".to_string(), document.file_size.to_string());
        extra.insert("page_count".to_string(), document.page_count.to_string());
        if page.flags.has_tables {
            extra.insert("has_tables".to_string(), "true".to_string());
        }
        if page.flags.has_images {
            extra.insert("has_images".to_string(), "true".to_string());
        }
        if page.flags.ocr_applied {
            extra.insert("ocr_applied".to_string(), "true".to_string());
        }

        Self {
            filename: document.filename.clone(),
            page_number: Some(page.page_number),
            extra,
            ..Self::default()
        }
    }

    /// Deduplication key: filename plus the global chunk id, or the local id
    /// when no global id was assigned.
    ///
    /// Chunks without a global id from different pages of the same file can
    /// collide; callers treat that as a degenerate case rather than an error.
    pub fn identity_key(&self) -> String {
        let id = self.global_chunk_id.unwrap_or(self.local_chunk_id);
        format!("{}_{id}", self.filename)
    }

    /// Flatten into the string map stored by the vector index.
    ///
    /// Every value is a string: numbers use their decimal form and absent
    /// optional fields become the empty string. Known fields take precedence
    /// over `extra` entries with the same key.
    pub fn to_index_metadata(&self) -> BTreeMap<String, String> {
        fn opt<T: ToString>(value: &Option<T>) -> String {
            value.as_ref().map(ToString::to_string).unwrap_or_default()
        }

        let mut map = self.extra.clone();
        map.insert(keys::FILENAME.to_string(), self.filename.clone());
        map.insert(keys::PAGE_NUMBER.to_string(), opt(&self.page_number));
        map.insert(keys::SECTION.to_string(), opt(&self.section));
        map.insert(keys::CHAPTER.to_string(), opt(&self.chapter));
        map.insert(keys::REFERENCE.to_string(), opt(&self.reference));
        map.insert(keys::LOCAL_CHUNK_ID.to_string(), self.local_chunk_id.to_string());
        map.insert(keys::GLOBAL_CHUNK_ID.to_string(), opt(&self.global_chunk_id));
        map.insert(keys::CHUNK_SIZE.to_string(), self.chunk_size.to_string());
        map
    }

    /// Rebuild metadata from the index's string map.
    ///
    /// Empty strings map back to `None`; unparsable numbers are treated as
    /// absent. Keys outside the known set are kept in `extra`.
    pub fn from_index_metadata(map: &BTreeMap<String, String>) -> Self {
        fn text(map: &BTreeMap<String, String>, key: &str) -> Option<String> {
            map.get(key).filter(|v| !v.is_empty()).cloned()
        }
        fn number<T: std::str::FromStr>(map: &BTreeMap<String, String>, key: &str) -> Option<T> {
            map.get(key).and_then(|v| v.parse().ok())
        }

        let extra = map
            .iter()
            .filter(|(key, _)| !keys::KNOWN.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            filename: map.get(keys::FILENAME).cloned().unwrap_or_default(),
            page_number: number(map, keys::PAGE_NUMBER),
            section: text(map, keys::SECTION),
            chapter: text(map, keys::CHAPTER),
            reference: text(map, keys::REFERENCE),
            local_chunk_id: number(map, keys::LOCAL_CHUNK_ID).unwrap_or_default(),
            global_chunk_id: number(map, keys::GLOBAL_CHUNK_ID),
            chunk_size: number(map, keys::CHUNK_SIZE).unwrap_or_default(),
            extra,
        }
    }
}

/// A bounded slice of document text, the atomic retrieval unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// A [`Chunk`] with its embedding attached. Read-only once created.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A retrieved chunk.
///
/// `distance` comes from semantic search (lower is closer); `score` is a
/// fused or reranked relevance (higher is better). The two are on different
/// scales and are never compared with each other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub content: String,
    pub metadata: ChunkMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChunkMetadata {
        let document = DocumentMetadata {
            filename: "manual.pdf".into(),
            file_path: "/docs/manual.pdf".into(),
            file_type: ".pdf".into(),
            file_size: 2048,
            page_count: 12,
        };
        let mut page = Page::new(4, "text");
        page.flags.has_tables = true;
        let mut metadata = ChunkMetadata::for_page(&document, &page);
        metadata.section = Some("1.2".into());
        metadata.local_chunk_id = 3;
        metadata.global_chunk_id = Some(41);
        metadata.chunk_size = 512;
        metadata
    }

    #[test]
    fn identity_key_prefers_global_id() {
        let mut metadata = sample();
        assert_eq!(metadata.identity_key(), "manual.pdf_41");
        metadata.global_chunk_id = None;
        assert_eq!(metadata.identity_key(), "manual.pdf_3");
    }

    #[test]
    fn index_metadata_is_all_strings_with_empty_for_none() {
        let map = sample().to_index_metadata();
        assert_eq!(map["page_number"], "4");
        assert_eq!(map["global_chunk_id"], "41");
        assert_eq!(map["chapter"], "");
        assert_eq!(map["reference"], "");
        assert_eq!(map["has_tables"], "true");
        assert_eq!(map["file_size"], "2048");
    }

    #[test]
    fn index_metadata_round_trips() {
        let metadata = sample();
        let restored = ChunkMetadata::from_index_metadata(&metadata.to_index_metadata());
        assert_eq!(restored, metadata);
    }

    #[test]
    fn known_fields_override_extra_entries() {
        let mut metadata = sample();
        metadata.extra.insert("filename".into(), "spoofed".into());
        assert_eq!(metadata.to_index_metadata()["filename"], "manual.pdf");
    }
}
