//! One question/answer turn against a session store.
//!
//! The user's question is recorded before any collaborator runs, so a failed
//! retrieval or generation still leaves the question in the transcript.

use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::RagError;
use super::prompt::build_prompt;
use super::traits::{Generator, RetrievedChunk, Retriever};
use crate::sessions::{Message, Metadata, Role, SessionError, SessionStore};

/// Tunables for a conversational turn.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Number of chunks requested from the retriever.
    pub top_k: usize,
    /// Prior messages rendered into the prompt; `0` keeps all of them.
    pub max_prompt_history: usize,
    /// Sampling temperature handed to the generator.
    pub temperature: f64,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            top_k: 4,
            max_prompt_history: 0,
            temperature: 0.1,
        }
    }
}

/// Outcome of a completed turn.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
    pub query_time: Duration,
    pub session_id: String,
    pub message_count: usize,
}

/// Retrieval-augmented chat over a [`SessionStore`].
pub struct ConversationalRag {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    options: ChatOptions,
}

struct PendingTurn {
    session_id: String,
    prompt: String,
    sources: Vec<RetrievedChunk>,
    started: Instant,
}

impl ConversationalRag {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        options: ChatOptions,
    ) -> Self {
        Self {
            retriever,
            generator,
            options,
        }
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    /// Answer `question` in `session_id` (created when missing or omitted).
    pub async fn ask(
        &self,
        store: &SessionStore,
        session_id: Option<&str>,
        question: &str,
    ) -> Result<ChatResponse, RagError> {
        let turn = self.begin_turn(store, session_id, question).await?;
        let answer = self
            .generator
            .generate(&turn.prompt, self.options.temperature)
            .await
            .map_err(RagError::Generation)?;
        self.finish_turn(store, turn, answer)
    }

    /// Like [`ask`](Self::ask), forwarding each generated fragment to `on_fragment`
    /// as it arrives. Nothing is recorded for the assistant if the stream fails.
    pub async fn ask_streaming<F>(
        &self,
        store: &SessionStore,
        session_id: Option<&str>,
        question: &str,
        mut on_fragment: F,
    ) -> Result<ChatResponse, RagError>
    where
        F: FnMut(&str) + Send,
    {
        let turn = self.begin_turn(store, session_id, question).await?;
        let mut fragments = self
            .generator
            .stream(&turn.prompt, self.options.temperature)
            .await
            .map_err(RagError::Generation)?;

        let mut answer = String::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment.map_err(RagError::Generation)?;
            on_fragment(&fragment);
            answer.push_str(&fragment);
        }
        self.finish_turn(store, turn, answer)
    }

    async fn begin_turn(
        &self,
        store: &SessionStore,
        session_id: Option<&str>,
        question: &str,
    ) -> Result<PendingTurn, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(
                SessionError::InvalidArgument("question must not be empty".to_string()).into(),
            );
        }

        let started = Instant::now();
        let session_metadata = self.session_metadata();
        let session_id = match session_id {
            Some(id) => store.open_session(id, session_metadata)?.0,
            None => store.create_session_with_metadata(None, session_metadata)?,
        };

        let history = self.prompt_history(store.get_history(&session_id));
        store.append_message(&session_id, Role::User, question, None)?;
        tracing::info!(session_id = %session_id, "Processing conversational query");

        let sources = self
            .retriever
            .retrieve(question, self.options.top_k)
            .await
            .map_err(RagError::Retrieval)?;

        Ok(PendingTurn {
            prompt: build_prompt(&history, &sources, question),
            session_id,
            sources,
            started,
        })
    }

    fn finish_turn(
        &self,
        store: &SessionStore,
        turn: PendingTurn,
        answer: String,
    ) -> Result<ChatResponse, RagError> {
        if answer.trim().is_empty() {
            return Err(RagError::Generation(anyhow::anyhow!(
                "model {} returned an empty answer",
                self.generator.model()
            )));
        }

        let query_time = turn.started.elapsed();
        let metadata = json!({
            "source_documents": turn.sources.len(),
            "query_time": query_time.as_secs_f64(),
            "model": self.generator.model(),
        });
        store.append_message(
            &turn.session_id,
            Role::Assistant,
            answer.as_str(),
            metadata.as_object().cloned(),
        )?;
        let message_count = store.get_history(&turn.session_id).len();

        tracing::info!(
            session_id = %turn.session_id,
            sources = turn.sources.len(),
            elapsed_ms = u64::try_from(query_time.as_millis()).unwrap_or(u64::MAX),
            "Conversational query processed"
        );

        Ok(ChatResponse {
            answer,
            sources: turn.sources,
            query_time,
            session_id: turn.session_id,
            message_count,
        })
    }

    fn session_metadata(&self) -> Option<Metadata> {
        json!({ "model": self.generator.model() }).as_object().cloned()
    }

    fn prompt_history(&self, mut history: Vec<Message>) -> Vec<Message> {
        let limit = self.options.max_prompt_history;
        if limit > 0 && history.len() > limit {
            history.drain(..history.len() - limit);
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};
    use parking_lot::Mutex;

    use crate::rag::traits::FragmentStream;

    struct FixedRetriever {
        chunks: Vec<RetrievedChunk>,
        fail: bool,
        seen_k: Mutex<Vec<usize>>,
    }

    impl FixedRetriever {
        fn with(chunks: Vec<RetrievedChunk>) -> Self {
            Self {
                chunks,
                fail: false,
                seen_k: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                chunks: Vec::new(),
                fail: true,
                seen_k: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
            self.seen_k.lock().push(k);
            if self.fail {
                bail!("vector store offline");
            }
            Ok(self.chunks.iter().take(k).cloned().collect())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    enum Script {
        Answer(&'static str),
        Fragments(Vec<&'static str>),
        BreakAfter(&'static str),
        Fail,
    }

    struct ScriptedGenerator {
        script: Script,
        prompts: Mutex<Vec<String>>,
        temperatures: Mutex<Vec<f64>>,
    }

    impl ScriptedGenerator {
        fn new(script: Script) -> Self {
            Self {
                script,
                prompts: Mutex::new(Vec::new()),
                temperatures: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, prompt: &str, temperature: f64) -> Result<String> {
            self.prompts.lock().push(prompt.to_string());
            self.temperatures.lock().push(temperature);
            match &self.script {
                Script::Answer(text) => Ok((*text).to_string()),
                Script::Fragments(parts) => Ok(parts.concat()),
                Script::BreakAfter(_) | Script::Fail => bail!("connection refused"),
            }
        }

        async fn stream(&self, prompt: &str, temperature: f64) -> Result<FragmentStream> {
            self.prompts.lock().push(prompt.to_string());
            self.temperatures.lock().push(temperature);
            let items: Vec<Result<String>> = match &self.script {
                Script::Answer(text) => vec![Ok((*text).to_string())],
                Script::Fragments(parts) => parts.iter().map(|p| Ok((*p).to_string())).collect(),
                Script::BreakAfter(first) => vec![
                    Ok((*first).to_string()),
                    Err(anyhow::anyhow!("stream interrupted")),
                ],
                Script::Fail => bail!("connection refused"),
            };
            Ok(stream::iter(items).boxed())
        }

        fn model(&self) -> &str {
            "test-model"
        }
    }

    fn engine(
        retriever: FixedRetriever,
        script: Script,
    ) -> (ConversationalRag, Arc<FixedRetriever>, Arc<ScriptedGenerator>) {
        let retriever = Arc::new(retriever);
        let generator = Arc::new(ScriptedGenerator::new(script));
        let rag = ConversationalRag::new(
            retriever.clone(),
            generator.clone(),
            ChatOptions::default(),
        );
        (rag, retriever, generator)
    }

    fn sample_chunks() -> Vec<RetrievedChunk> {
        vec![
            RetrievedChunk::new("RAG retrieves documents first.", "sample1"),
            RetrievedChunk::new("Then it generates an answer.", "sample2"),
        ]
    }

    #[tokio::test]
    async fn ask_records_both_sides_of_the_turn() {
        let store = SessionStore::new();
        let (rag, retriever, _) = engine(
            FixedRetriever::with(sample_chunks()),
            Script::Answer("RAG combines retrieval and generation."),
        );

        let response = rag.ask(&store, Some("s1"), "What is RAG?").await.unwrap();

        assert_eq!(response.session_id, "s1");
        assert_eq!(response.answer, "RAG combines retrieval and generation.");
        assert_eq!(response.sources.len(), 2);
        assert_eq!(response.message_count, 2);
        assert_eq!(*retriever.seen_k.lock(), vec![4]);

        let history = store.get_history("s1");
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "What is RAG?");
        assert_eq!(history[1].role, Role::Assistant);
        let meta = history[1].metadata.as_ref().unwrap();
        assert_eq!(meta["source_documents"], 2);
        assert_eq!(meta["model"], "test-model");
        assert!(meta["query_time"].as_f64().unwrap() >= 0.0);

        let session = store.get_session("s1").unwrap();
        assert_eq!(session.metadata.unwrap()["model"], "test-model");
    }

    #[tokio::test]
    async fn ask_without_session_creates_one() {
        let store = SessionStore::new();
        let (rag, _, _) = engine(FixedRetriever::with(Vec::new()), Script::Answer("ok"));

        let response = rag.ask(&store, None, "hello").await.unwrap();

        assert!(response.session_id.starts_with("session_"));
        assert_eq!(store.list_sessions(), vec![response.session_id.clone()]);
    }

    #[tokio::test]
    async fn follow_up_prompt_includes_previous_turns() {
        let store = SessionStore::new();
        let (rag, _, generator) = engine(
            FixedRetriever::with(sample_chunks()),
            Script::Answer("answer"),
        );

        rag.ask(&store, Some("s"), "What is RAG?").await.unwrap();
        rag.ask(&store, Some("s"), "And how is it used?").await.unwrap();

        let prompts = generator.prompts.lock();
        assert!(!prompts[0].contains("User: What is RAG?"));
        assert!(prompts[1].contains("User: What is RAG?"));
        assert!(prompts[1].contains("Assistant: answer"));
        assert!(!prompts[1].contains("User: And how is it used?"));
        assert!(prompts[1].contains("Question: And how is it used?"));
        assert_eq!(store.get_history("s").len(), 4);
    }

    #[tokio::test]
    async fn prompt_history_is_bounded_when_configured() {
        let store = SessionStore::new();
        let generator = Arc::new(ScriptedGenerator::new(Script::Answer("a")));
        let rag = ConversationalRag::new(
            Arc::new(FixedRetriever::with(Vec::new())),
            generator.clone(),
            ChatOptions {
                top_k: 2,
                max_prompt_history: 2,
                temperature: 0.7,
            },
        );

        rag.ask(&store, Some("s"), "first").await.unwrap();
        rag.ask(&store, Some("s"), "second").await.unwrap();
        rag.ask(&store, Some("s"), "third").await.unwrap();

        let prompts = generator.prompts.lock();
        assert!(!prompts[2].contains("User: first"));
        assert!(prompts[2].contains("User: second"));
        assert_eq!(*generator.temperatures.lock(), vec![0.7, 0.7, 0.7]);
    }

    #[tokio::test]
    async fn retrieval_failure_keeps_the_question() {
        let store = SessionStore::new();
        let (rag, _, generator) = engine(FixedRetriever::failing(), Script::Answer("unused"));

        let err = rag.ask(&store, Some("s"), "Anyone there?").await.unwrap_err();

        assert!(matches!(err, RagError::Retrieval(_)));
        assert!(err.to_string().contains("vector store offline"));
        let history = store.get_history("s");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "Anyone there?");
        assert!(generator.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn generation_failure_keeps_the_question() {
        let store = SessionStore::new();
        let (rag, _, _) = engine(FixedRetriever::with(sample_chunks()), Script::Fail);

        let err = rag.ask(&store, Some("s"), "What is RAG?").await.unwrap_err();

        assert!(matches!(err, RagError::Generation(_)));
        assert!(err.hint().is_some());
        assert_eq!(store.get_history("s").len(), 1);
        assert_eq!(store.get_history("s")[0].role, Role::User);
    }

    #[tokio::test]
    async fn blank_questions_are_rejected_before_recording() {
        let store = SessionStore::new();
        let (rag, _, _) = engine(FixedRetriever::with(Vec::new()), Script::Answer("x"));

        let err = rag.ask(&store, Some("s"), "   ").await.unwrap_err();

        assert!(matches!(
            err,
            RagError::Session(SessionError::InvalidArgument(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn empty_answers_are_not_recorded() {
        let store = SessionStore::new();
        let (rag, _, _) = engine(FixedRetriever::with(Vec::new()), Script::Answer("  "));

        let err = rag.ask(&store, Some("s"), "hello").await.unwrap_err();

        assert!(matches!(err, RagError::Generation(_)));
        assert_eq!(store.get_history("s").len(), 1);
    }

    #[tokio::test]
    async fn streaming_forwards_fragments_and_records_the_whole_answer() {
        let store = SessionStore::new();
        let (rag, _, _) = engine(
            FixedRetriever::with(sample_chunks()),
            Script::Fragments(vec!["RAG ", "combines ", "retrieval."]),
        );

        let mut seen = Vec::new();
        let response = rag
            .ask_streaming(&store, Some("s"), "What is RAG?", |fragment| {
                seen.push(fragment.to_string());
            })
            .await
            .unwrap();

        assert_eq!(seen, vec!["RAG ", "combines ", "retrieval."]);
        assert_eq!(response.answer, "RAG combines retrieval.");
        assert_eq!(store.get_history("s")[1].content, "RAG combines retrieval.");
    }

    #[tokio::test]
    async fn interrupted_stream_records_only_the_question() {
        let store = SessionStore::new();
        let (rag, _, _) = engine(
            FixedRetriever::with(Vec::new()),
            Script::BreakAfter("partial"),
        );

        let mut seen = Vec::new();
        let err = rag
            .ask_streaming(&store, Some("s"), "hello", |fragment| {
                seen.push(fragment.to_string());
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RagError::Generation(_)));
        assert_eq!(seen, vec!["partial"]);
        assert_eq!(store.get_history("s").len(), 1);
    }
}
