//! End-to-end session behavior with offline embeddings and a scripted model.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ragchat_chat::{
    ChatConfig, ChatError, NOT_INITIALIZED_MESSAGE, Orchestrator, OrchestratorState,
};
use ragchat_model::{MockGenerator, TextGenerator};
use ragchat_rag::{EmbeddingProvider, HashingEmbeddingProvider, RagError};

/// Embeds the first batch, then fails every later batch.
struct SecondBatchFails {
    inner: HashingEmbeddingProvider,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for SecondBatchFails {
    async fn embed(&self, text: &str) -> ragchat_rag::Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> ragchat_rag::Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(RagError::EmbeddingError { provider: "flaky".into(), message: "503".into() });
        }
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

const MANUAL_PAGES: [&str; 3] = [
    "Engine oil must be changed every 5000 km or six months.",
    "Tire pressure should be checked monthly when the tires are cold.",
    "The spare wheel is stored under the floor of the trunk.",
];

const GUIDE_PAGES: [&str; 5] = [
    "Bread needs flour, water, salt and yeast.",
    "Knead the dough for ten minutes until smooth.",
    "Let the dough rise for one hour in a warm place.",
    "Bake at 230 degrees for thirty minutes.",
    "Cool the loaf on a rack before slicing.",
];

fn write_corpus(root: &Path) {
    fs::create_dir_all(root).unwrap();
    fs::write(root.join("manual.txt"), MANUAL_PAGES.join("\u{0C}")).unwrap();
    fs::write(root.join("guide.txt"), GUIDE_PAGES.join("\u{0C}")).unwrap();
    fs::write(root.join("corrupted.txt"), [0x50, 0x4b, 0xff, 0xfe, 0x00, 0xc3]).unwrap();
}

fn session(temp: &Path, generator: Arc<dyn TextGenerator>) -> Orchestrator {
    let config = ChatConfig { history_dir: temp.join("history"), ..ChatConfig::default() };
    Orchestrator::builder()
        .config(config)
        .embedding_provider(Arc::new(HashingEmbeddingProvider::new(256).unwrap()))
        .generator(generator)
        .build()
        .unwrap()
}

async fn loaded_session(temp: &Path, generator: Arc<dyn TextGenerator>) -> Orchestrator {
    let docs = temp.join("docs");
    write_corpus(&docs);
    let mut chat = session(temp, generator);
    chat.load(&docs).await.unwrap();
    chat
}

#[tokio::test]
async fn loading_skips_corrupted_files_and_indexes_valid_pages() {
    let temp = tempfile::tempdir().unwrap();
    let docs = temp.path().join("docs");
    write_corpus(&docs);
    let mut chat = session(temp.path(), Arc::new(MockGenerator::new(["ok"])));

    let report = chat.load(&docs).await.unwrap();
    assert_eq!(report.document_count, 2);
    assert_eq!(report.chunk_count, 8);
    assert_eq!(chat.state(), OrchestratorState::Ready);

    let info = chat.database_info().await.unwrap();
    assert_eq!(info.name, "rag_documents");
    assert_eq!(info.document_count, 8);
    assert!(info.is_initialized);
    assert_eq!(info.chat_history_length, 0);

    let snapshot = chat.pipeline().vector_store().get_all("rag_documents", None).await.unwrap();
    let mut filenames: Vec<&str> = snapshot.metadatas.iter().map(|m| m["filename"].as_str()).collect();
    filenames.dedup();
    assert_eq!(filenames, vec!["guide.txt", "manual.txt"]);

    let mut global_ids: Vec<usize> =
        snapshot.metadatas.iter().map(|m| m["global_chunk_id"].parse().unwrap()).collect();
    global_ids.sort_unstable();
    assert_eq!(global_ids, (0..8).collect::<Vec<_>>());
}

#[tokio::test]
async fn query_before_load_is_rejected_without_history() {
    let temp = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new(["unused"]));
    let mut chat = session(temp.path(), generator.clone());

    assert_eq!(chat.query("What is the oil interval?", 5).await, NOT_INITIALIZED_MESSAGE);
    let stream = chat.stream_query("And the tire pressure?", 5).await;
    assert_eq!(stream.collect_text().await, NOT_INITIALIZED_MESSAGE);

    assert!(chat.history().is_empty());
    assert!(generator.prompts().is_empty());
    assert!(chat.relevant_sources("oil", 5).await.is_empty());
}

#[tokio::test]
async fn failed_load_keeps_previous_state() {
    let temp = tempfile::tempdir().unwrap();
    let empty = temp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();
    fs::write(empty.join("notes.csv"), "a,b").unwrap();

    let mut chat = session(temp.path(), Arc::new(MockGenerator::new(["ok"])));
    let err = chat.load(&empty).await.unwrap_err();
    assert!(matches!(err, ChatError::EmptyInput(_)));
    assert_eq!(chat.state(), OrchestratorState::Uninitialized);

    let docs = temp.path().join("docs");
    write_corpus(&docs);
    chat.load(&docs).await.unwrap();
    fs::write(empty.join("blank.txt"), " \u{0C} ").unwrap();
    assert!(chat.load(&empty).await.is_err());
    assert_eq!(chat.state(), OrchestratorState::Ready);
}

#[tokio::test]
async fn failed_embedding_leaves_no_chunks_behind() {
    let temp = tempfile::tempdir().unwrap();
    let docs = temp.path().join("docs");
    write_corpus(&docs);

    let config = ChatConfig { embed_batch_size: 2, ..ChatConfig::default() };
    let mut chat = Orchestrator::builder()
        .config(config)
        .embedding_provider(Arc::new(SecondBatchFails {
            inner: HashingEmbeddingProvider::new(64).unwrap(),
            calls: AtomicUsize::new(0),
        }))
        .generator(Arc::new(MockGenerator::new(["unused"])))
        .build()
        .unwrap();

    let err = chat.load(&docs).await.unwrap_err();
    assert!(matches!(err, ChatError::ExternalService(_)));
    assert_eq!(chat.state(), OrchestratorState::Uninitialized);
    let info = chat.database_info().await.unwrap();
    assert_eq!(info.document_count, 0);
    assert!(!info.is_initialized);
}

#[tokio::test]
async fn query_records_exchange_with_sources() {
    let temp = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new(["Every 5000 km ", "[Document: manual.txt, Page: 1]"]));
    let mut chat = loaded_session(temp.path(), generator.clone()).await;

    let answer = chat.query("How often is the engine oil changed?", 3).await;
    assert_eq!(answer, "Every 5000 km [Document: manual.txt, Page: 1]");

    let history = chat.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].human, "How often is the engine oil changed?");
    assert_eq!(history[0].assistant, answer);
    assert!(!history[0].sources.is_empty() && history[0].sources.len() <= 3);

    let prompt = &generator.prompts()[0];
    assert!(prompt.contains("=== CONTEXT DOCUMENTS ==="));
    assert!(prompt.contains("Engine oil must be changed"));
    assert!(!prompt.contains("=== CONVERSATION CONTEXT ==="));
    assert!(prompt.ends_with("with accurate citations:"));
}

#[tokio::test]
async fn follow_up_questions_carry_conversation_context() {
    let temp = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new(["Monthly."]));
    let mut chat = loaded_session(temp.path(), generator.clone()).await;

    chat.query("When should tire pressure be checked?", 3).await;
    chat.query("And should they be cold?", 3).await;

    let prompt = &generator.prompts()[1];
    let window = prompt.find("=== CONVERSATION CONTEXT ===").unwrap();
    let documents = prompt.find("=== CONTEXT DOCUMENTS ===").unwrap();
    let history = prompt.find("Previous Conversation:").unwrap();
    assert!(window < documents && documents < history);
    assert!(prompt.contains("User: When should tire pressure be checked?\nAssistant: Monthly."));
    assert!(prompt.contains("\nHuman: When should tire pressure be checked?\nAssistant: Monthly."));
}

#[tokio::test]
async fn generation_failure_is_answered_with_user_message() {
    let temp = tempfile::tempdir().unwrap();
    let mut chat = loaded_session(temp.path(), Arc::new(MockGenerator::unreachable())).await;

    let answer = chat.query("How do I bake bread?", 3).await;
    assert_eq!(answer, "Sorry, I encountered an error while processing your request.");
    assert_eq!(chat.history().len(), 1);

    let stream = chat.stream_query("How long does the dough rise?", 3).await;
    assert_eq!(
        stream.collect_text().await,
        "Error: Sorry, I encountered an error while processing your request."
    );
    assert_eq!(chat.history().len(), 1);
}

#[tokio::test]
async fn streamed_answer_is_recorded_in_full() {
    let temp = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new(["Bake ", "at 230 ", "degrees."]));
    let mut chat = loaded_session(temp.path(), generator).await;

    let mut stream = chat.stream_query("What temperature for bread?", 3).await;
    let mut increments = Vec::new();
    while let Some(text) = stream.next().await {
        increments.push(text);
    }
    assert_eq!(increments, vec!["Bake ", "at 230 ", "degrees."]);
    assert!(stream.next().await.is_none());
    drop(stream);

    assert_eq!(chat.history().len(), 1);
    assert_eq!(chat.history()[0].assistant, "Bake at 230 degrees.");
}

#[tokio::test]
async fn cancelled_stream_records_partial_answer() {
    let temp = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new(["Knead ", "for ten ", "minutes."]));
    let mut chat = loaded_session(temp.path(), generator).await;

    let mut stream = chat.stream_query("How long to knead?", 3).await;
    assert_eq!(stream.next().await.as_deref(), Some("Knead "));
    drop(stream);

    assert_eq!(chat.history().len(), 1);
    assert_eq!(chat.history()[0].assistant, "Knead ");
    assert_eq!(chat.state(), OrchestratorState::Ready);
}

#[tokio::test]
async fn mid_stream_failure_keeps_text_already_yielded() {
    let temp = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new(["Cool the loaf ", "on a rack"]).failing_after("connection reset"));
    let mut chat = loaded_session(temp.path(), generator).await;

    let text = chat.stream_query("What happens after baking?", 3).await.collect_text().await;
    assert_eq!(
        text,
        "Cool the loaf on a rackError: Sorry, I encountered an error while processing your request."
    );
    assert_eq!(chat.history().len(), 1);
    assert_eq!(chat.history()[0].assistant, "Cool the loaf on a rack");
}

#[tokio::test]
async fn clear_resets_to_uninitialized() {
    let temp = tempfile::tempdir().unwrap();
    let mut chat = loaded_session(temp.path(), Arc::new(MockGenerator::new(["ok"]))).await;
    chat.query("spare wheel?", 2).await;

    assert_eq!(chat.clear().await.unwrap(), 8);
    assert_eq!(chat.state(), OrchestratorState::Uninitialized);
    let info = chat.database_info().await.unwrap();
    assert_eq!(info.document_count, 0);
    assert!(!info.is_initialized);
    assert_eq!(info.chat_history_length, 1);
    assert_eq!(chat.query("spare wheel?", 2).await, NOT_INITIALIZED_MESSAGE);

    chat.clear_history();
    assert!(chat.history().is_empty());
}

#[tokio::test]
async fn relevant_sources_skip_generation() {
    let temp = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new(["unused"]));
    let chat = loaded_session(temp.path(), generator.clone()).await;

    let sources = chat.relevant_sources("Where is the spare wheel stored?", 2).await;
    assert_eq!(sources.len(), 2);
    assert!(sources.iter().any(|s| s.content.contains("spare wheel")));
    assert!(generator.prompts().is_empty());
    assert!(chat.history().is_empty());
}

#[tokio::test]
async fn history_survives_save_and_load() {
    let temp = tempfile::tempdir().unwrap();
    let mut chat = loaded_session(temp.path(), Arc::new(MockGenerator::new(["Yes."]))).await;
    chat.query("Is there a spare wheel?", 2).await;
    chat.query("Under the trunk floor?", 2).await;

    let path = chat.save_history(None).unwrap();
    assert!(path.starts_with(temp.path().join("history")));
    let saved = chat.history().to_vec();

    chat.clear_history();
    assert_eq!(chat.load_history(&path).unwrap(), 2);
    assert_eq!(chat.history(), saved.as_slice());

    assert!(chat.load_history(&temp.path().join("missing.json")).is_err());
    assert_eq!(chat.history().len(), 2);
}
