//! Splitting page text into overlapping chunks.
//!
//! [`RecursiveSplitter`] does the text work: it tries separators from the
//! coarsest (`"\n\n"`) to the finest (`""`, one character), and merges the
//! resulting pieces into windows of at most `chunk_size` characters, carrying
//! up to `chunk_overlap` characters of the previous window into the next.
//!
//! [`ChunkAssembler`] wraps the splitter with text cleaning, section marker
//! detection, and chunk id assignment.

use std::collections::VecDeque;
use std::sync::LazyLock;

use ragchat_telemetry::LogContext;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::document::{Chunk, ChunkMetadata, SourceDocument};

/// Separators tried in order, coarsest first. The empty separator splits
/// into single characters and guarantees termination.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").expect("unreachable error: failed to compile whitespace pattern")
});
static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\w\s.,!?;:\-()]").expect("unreachable error: failed to compile charset pattern")
});
static REPEATED_TERMINATORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[.!?]{2,}").expect("unreachable error: failed to compile punctuation pattern")
});

static SECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^(?:Section|§)\s*([IVXLCDMivxlcdm]+|\d+)",
        r"(?m)^(\d+\.\d+)\s",
        r"(?m)^[IVXLCDM]+\.",
        r"(?m)^[A-Z][A-Z\s]+\n",
        r"(?m)^\d+\.\s+[A-Z]",
    ]
    .iter()
    .map(|pattern| {
        Regex::new(pattern).expect("unreachable error: failed to compile section pattern")
    })
    .collect()
});

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Normalize text before splitting.
///
/// Whitespace runs become one space, characters outside word characters,
/// whitespace and `. , ! ? ; : - ( )` are dropped, and runs of terminal
/// punctuation collapse to their last character. This is lossy: symbols such
/// as `%`, `$` or `/` disappear from the indexed text.
pub fn clean_text(text: &str) -> String {
    let collapsed = WHITESPACE_RUN.replace_all(text, " ");
    let stripped = UNSAFE_CHARS.replace_all(&collapsed, "");
    let terminated = REPEATED_TERMINATORS.replace_all(&stripped, |caps: &regex::Captures<'_>| {
        caps[0].chars().last().map(String::from).unwrap_or_default()
    });
    terminated.trim().to_string()
}

/// Find a section marker (heading or numbering pattern) in a chunk.
///
/// Patterns are tried in a fixed order; the first match wins. Returns `None`
/// when nothing matches.
pub fn detect_section(text: &str) -> Option<String> {
    SECTION_PATTERNS
        .iter()
        .find_map(|pattern| pattern.find(text))
        .map(|m| m.as_str().trim().to_string())
        .filter(|marker| !marker.is_empty())
}

/// Hierarchical splitter with a sliding character overlap.
///
/// Lengths are measured in characters, not bytes. Callers are expected to
/// keep `chunk_overlap < chunk_size` (enforced by [`RagConfig::validate`]).
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    /// Create a splitter using [`DEFAULT_SEPARATORS`].
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the separator cascade.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Split `text` into windows of at most `chunk_size` characters.
    ///
    /// A window can only exceed the limit when the separator list has no
    /// empty separator and an unsplittable piece is longer than the limit.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                let piece = piece.trim();
                if !piece.is_empty() {
                    chunks.push(piece.to_string());
                }
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }
        chunks
    }

    /// Greedily pack pieces into windows. When a window is emitted, pieces
    /// are dropped from its front until what remains is no longer than
    /// `chunk_overlap` and leaves room for the next piece; the remainder
    /// seeds the following window.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut windows = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(window) = join_pieces(&current) {
                    windows.push(window);
                }
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some(front) = current.pop_front() else { break };
                    total -= char_len(front);
                }
            }
            current.push_back(piece);
            total += len;
        }

        if let Some(window) = join_pieces(&current) {
            windows.push(window);
        }
        windows
    }
}

/// Pick the first separator that occurs in `text`, returning it together
/// with the finer separators left for recursion.
fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return ("", &[]);
        }
        if text.contains(separator.as_str()) {
            return (separator.as_str(), &separators[i + 1..]);
        }
    }
    (separators.last().map(String::as_str).unwrap_or(""), &[])
}

/// Split at every occurrence of `separator`, attaching the separator to the
/// start of the piece that follows it. Empty pieces are dropped.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
    }

    let mut boundaries: Vec<usize> = vec![0];
    boundaries.extend(text.match_indices(separator).map(|(i, _)| i));
    boundaries.push(text.len());

    boundaries
        .windows(2)
        .map(|w| &text[w[0]..w[1]])
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn join_pieces(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Sequential chunk id source shared by every page of every document in one
/// load run.
#[derive(Debug, Clone, Default)]
pub struct GlobalChunkCounter {
    next: usize,
}

impl GlobalChunkCounter {
    /// Start counting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting at `first`.
    pub fn starting_at(first: usize) -> Self {
        Self { next: first }
    }

    /// Return the next id and advance.
    pub fn next_id(&mut self) -> usize {
        let id = self.next;
        self.next += 1;
        id
    }

    /// The id the next chunk will receive.
    pub fn peek(&self) -> usize {
        self.next
    }
}

/// Turns page text into [`Chunk`]s with structural metadata.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_rag::{ChunkAssembler, GlobalChunkCounter};
///
/// let assembler = ChunkAssembler::new(1000, 200);
/// let mut counter = GlobalChunkCounter::new();
/// let chunks = assembler.chunk(&page.text, &base_metadata, Some(&mut counter));
/// ```
#[derive(Debug, Clone)]
pub struct ChunkAssembler {
    splitter: RecursiveSplitter,
    detect_sections: bool,
    log: LogContext,
}

impl ChunkAssembler {
    /// Create an assembler with the default separator cascade.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            splitter: RecursiveSplitter::new(chunk_size, chunk_overlap),
            detect_sections: true,
            log: LogContext::disabled(),
        }
    }

    /// Create an assembler from the chunk settings of a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Replace the underlying splitter.
    pub fn with_splitter(mut self, splitter: RecursiveSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    /// Enable or disable section marker detection.
    pub fn with_section_detection(mut self, enabled: bool) -> Self {
        self.detect_sections = enabled;
        self
    }

    /// Attach the logging context of the owning session.
    pub fn with_log_context(mut self, log: LogContext) -> Self {
        self.log = log;
        self
    }

    /// Clean and split `text`, stamping each chunk with a copy of `metadata`.
    ///
    /// `local_chunk_id` counts from zero within this call. When `counter` is
    /// given, each chunk also takes the next `global_chunk_id` from it.
    /// Empty or whitespace-only input yields no chunks.
    pub fn chunk(
        &self,
        text: &str,
        metadata: &ChunkMetadata,
        mut counter: Option<&mut GlobalChunkCounter>,
    ) -> Vec<Chunk> {
        let _span = self.log.enter();
        if text.trim().is_empty() {
            return Vec::new();
        }

        let cleaned = clean_text(text);
        let chunks: Vec<Chunk> = self
            .splitter
            .split(&cleaned)
            .into_iter()
            .enumerate()
            .map(|(local_id, content)| {
                let mut chunk_metadata = metadata.clone();
                chunk_metadata.local_chunk_id = local_id;
                chunk_metadata.chunk_size = char_len(&content);
                if self.detect_sections {
                    if let Some(section) = detect_section(&content) {
                        chunk_metadata.section = Some(section);
                    }
                }
                if let Some(counter) = counter.as_deref_mut() {
                    chunk_metadata.global_chunk_id = Some(counter.next_id());
                }
                Chunk { content, metadata: chunk_metadata }
            })
            .collect();

        debug!(filename = %metadata.filename, chunk_count = chunks.len(), "chunked text");
        chunks
    }

    /// Chunk every page of every document with one shared id counter.
    ///
    /// Global ids are assigned in document order, then page order, so the
    /// numbering is reproducible for a given input sequence.
    pub fn assemble(&self, documents: &[SourceDocument]) -> Vec<Chunk> {
        let mut counter = GlobalChunkCounter::new();
        self.assemble_with(documents, &mut counter)
    }

    /// Like [`assemble`](Self::assemble), continuing from an existing counter.
    pub fn assemble_with(
        &self,
        documents: &[SourceDocument],
        counter: &mut GlobalChunkCounter,
    ) -> Vec<Chunk> {
        let mut all_chunks = Vec::new();
        for document in documents {
            let before = all_chunks.len();
            for page in &document.pages {
                let base = ChunkMetadata::for_page(&document.metadata, page);
                all_chunks.extend(self.chunk(&page.text, &base, Some(&mut *counter)));
            }
            let produced = all_chunks.len() - before;
            let _span = self.log.enter();
            if produced == 0 {
                warn!(filename = %document.metadata.filename, "document produced no chunks, skipped");
            } else {
                debug!(filename = %document.metadata.filename, chunk_count = produced, "document chunked");
            }
        }

        let _span = self.log.enter();
        info!(document_count = documents.len(), chunk_count = all_chunks.len(), "total chunks created");
        all_chunks
    }
}
