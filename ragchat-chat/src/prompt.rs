//! Rendering the final generation prompt.
//!
//! Blocks always appear in this order, each only when it has content:
//!
//! 1. system preamble with citation rules
//! 2. conversation window
//! 3. context documents, one delimited block per chunk
//! 4. previous conversation (raw trailing history)
//! 5. current question and answer instruction

use ragchat_rag::{ChunkMetadata, RetrievalResult};

use crate::config::PromptConfig;
use crate::conversation::Exchange;

const PREAMBLE: &str = "\
You're a helpful research assistant who answers questions based on provided research documents.
Follow these guidelines STRICTLY:

1. Provide detailed, coherent answers in natural paragraphs.
2. ALWAYS include specific citations in the format: [Document: filename, Page: X]
3. If the context includes section headings, chapter numbers, or reference information, cite those as well (e.g., [Document: filename, Page: X, Section: Y] or [Document: filename, Chapter: Z, Page: X]).
4. If the information comes from a reference section, cite it as such (e.g., [Document: filename, Page: X, Reference: ...]).
5. If the documents don't contain relevant information, state that clearly instead of guessing.
6. Maintain a professional, clear style.
7. Only answer based on the provided documents.

EXAMPLE CITATIONS:
- [Document: research.pdf, Page: 5]
- [Document: manual.pdf, Pages: 12, 15]
- [Document: rep.pdf, Page: 3, Section: Introduction]
- [Document: paper.pdf, Page: 6, Section: 1.2]
- [Document: experiment.pdf, Page: 1, Section: A]
- [Document: predict.pdf, Page: 4, Section: II]
";

pub(crate) const CONVERSATION_HEADER: &str = "\n=== CONVERSATION CONTEXT ===";
pub(crate) const DOCUMENTS_HEADER: &str = "\n=== CONTEXT DOCUMENTS ===";
pub(crate) const HISTORY_HEADER: &str = "\nPrevious Conversation:";
const ANSWER_INSTRUCTION: &str =
    "\nAnswer based on the context provided above, with accurate citations:";

fn rule() -> String {
    "=".repeat(50)
}

/// Citation tag for a chunk, e.g. `[Document: manual.pdf, Page: 4, Section: 1.2]`.
pub fn citation(metadata: &ChunkMetadata) -> String {
    let filename = if metadata.filename.is_empty() { "Unknown" } else { &metadata.filename };
    let page = metadata.page_number.map_or_else(|| "N/A".to_string(), |p| p.to_string());

    let mut tag = format!("[Document: {filename}, Page: {page}");
    if let Some(section) = &metadata.section {
        tag.push_str(&format!(", Section: {section}"));
    }
    if let Some(chapter) = &metadata.chapter {
        tag.push_str(&format!(", Chapter: {chapter}"));
    }
    if let Some(reference) = &metadata.reference {
        tag.push_str(&format!(", Reference: {reference}"));
    }
    tag.push(']');
    tag
}

/// Cut `content` to `max_chars` characters, marking the cut with `...`.
fn truncate(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &content[..byte_index]),
        None => content.to_string(),
    }
}

/// Builds generation prompts from retrieved context and chat history.
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    config: PromptConfig,
}

impl PromptAssembler {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PromptConfig {
        &self.config
    }

    /// Render the prompt for `query`.
    ///
    /// `conversation_window` is the output of
    /// [`ConversationManager::window`](crate::ConversationManager::window);
    /// it is rendered separately from the raw `history` block.
    pub fn build(
        &self,
        query: &str,
        context: &[RetrievalResult],
        history: &[Exchange],
        conversation_window: Option<&str>,
    ) -> String {
        let mut parts: Vec<String> = vec![PREAMBLE.to_string()];

        if let Some(window) = conversation_window.filter(|w| !w.is_empty()) {
            parts.push(CONVERSATION_HEADER.to_string());
            parts.push(window.to_string());
            parts.push(rule());
        }

        if !context.is_empty() {
            parts.push(DOCUMENTS_HEADER.to_string());
            for (i, chunk) in context.iter().enumerate() {
                parts.push(format!("\n--- Document {} {} ---", i + 1, citation(&chunk.metadata)));
                parts.push(truncate(&chunk.content, self.config.max_chunk_chars));
            }
            parts.push(rule());
        }

        if !history.is_empty() && self.config.history_exchanges > 0 {
            parts.push(HISTORY_HEADER.to_string());
            let start = history.len().saturating_sub(self.config.history_exchanges);
            for exchange in &history[start..] {
                parts.push(format!("\nHuman: {}", exchange.human));
                parts.push(format!("Assistant: {}", exchange.assistant));
            }
            parts.push(format!("\n{}", rule()));
        }

        parts.push(format!("\nCurrent Question: {query}"));
        parts.push(ANSWER_INSTRUCTION.to_string());
        parts.join("\n")
    }
}
