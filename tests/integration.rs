//! End-to-end turns over a real on-disk index, with the remote services
//! replaced by in-process stand-ins.

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use syllabus_advisor::answer::AnswerService;
use syllabus_advisor::embedding::EmbeddingProvider;
use syllabus_advisor::error::{Error, Result};
use syllabus_advisor::index_build::{parse_corpus, IndexWriter};
use syllabus_advisor::models::{Message, Role};
use syllabus_advisor::orchestrator::{Orchestrator, TurnOutcome};
use syllabus_advisor::prompt::{PromptTemplate, DEFAULT_TEMPLATE};
use syllabus_advisor::session::Session;
use syllabus_advisor::store::{Retriever, VectorStore};

/// Bag-of-keywords embedder: one dimension per keyword.
struct KeywordEmbedder;

const KEYWORDS: [&str; 4] = ["SFC", "プログラミング", "英語", "研究会"];

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }
    fn dims(&self) -> usize {
        KEYWORDS.len()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                KEYWORDS
                    .iter()
                    .map(|k| t.matches(k).count() as f32)
                    .collect()
            })
            .collect())
    }
}

/// Answers with a fixed text and records every prompt, or fails with a
/// transport error.
struct ScriptedAnswer {
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl ScriptedAnswer {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            fail,
        })
    }
}

#[async_trait]
impl AnswerService for ScriptedAnswer {
    fn model_name(&self) -> &str {
        "scripted"
    }
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            Err(Error::AnswerService(
                "Gemini API request failed: connection refused".into(),
            ))
        } else {
            Ok("SFCは研究会が魅力です。".to_string())
        }
    }
}

const CORPUS: &str = r#"
{"content": "SFCの研究会では学年を問わず研究できます。", "source_url": "https://syllabus.example/u1"}
{"content": "SFCのプログラミング授業は実践的です。", "source_url": "https://syllabus.example/u2"}
{"content": "SFC研究会の紹介ページ", "source_url": "https://syllabus.example/u1"}
{"content": "英語の授業一覧", "source_url": "https://syllabus.example/u3"}
"#;

async fn build_index(dir: &Path, corpus: &str) {
    let embedder = KeywordEmbedder;
    let entries = parse_corpus(corpus).unwrap();
    let mut writer = IndexWriter::create(dir, embedder.model_name(), embedder.dims(), false)
        .await
        .unwrap();
    let texts: Vec<String> = entries.iter().map(|e| e.content.clone()).collect();
    let vectors = embedder.embed(&texts).await.unwrap();
    for (entry, vector) in entries.iter().zip(vectors.iter()) {
        writer
            .insert(&entry.content, &entry.metadata, vector)
            .await
            .unwrap();
    }
    writer.finish().await.unwrap();
}

async fn load_store(dir: &Path) -> Arc<VectorStore> {
    Arc::new(
        VectorStore::load(dir, Arc::new(KeywordEmbedder), true)
            .await
            .unwrap(),
    )
}

fn orchestrator(store: Arc<VectorStore>, answer: Arc<ScriptedAnswer>, top_k: usize) -> Orchestrator {
    Orchestrator::new(
        store,
        answer,
        PromptTemplate::new(DEFAULT_TEMPLATE).unwrap(),
        top_k,
    )
}

#[tokio::test]
async fn test_turn_cites_deduplicated_sources() {
    let tmp = TempDir::new().unwrap();
    build_index(tmp.path(), CORPUS).await;
    let store = load_store(tmp.path()).await;
    assert_eq!(store.len(), 4);

    let answer = ScriptedAnswer::new(false);
    let orch = orchestrator(store, answer.clone(), 3);
    let mut session = Session::new();

    match orch.handle_turn(&mut session, "SFCの研究会について").await {
        TurnOutcome::Answered { answer, citations } => {
            assert_eq!(answer, "SFCは研究会が魅力です。");
            assert_eq!(
                citations,
                vec!["https://syllabus.example/u1", "https://syllabus.example/u2"]
            );
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let prompts = answer.prompts.lock().unwrap();
    assert!(prompts[0].contains("SFCの研究会では学年を問わず研究できます。"));
    assert!(prompts[0].contains("SFC研究会の紹介ページ"));
    assert!(prompts[0].contains("SFCのプログラミング授業は実践的です。"));
    assert!(!prompts[0].contains("英語の授業一覧"));
}

#[tokio::test]
async fn test_retrieval_caps_at_k_and_sorts_descending() {
    let tmp = TempDir::new().unwrap();
    let corpus: String = (0..15)
        .map(|i| {
            let body = "SFC ".repeat(i % 4) + &"英語 ".repeat(3 - i % 4) + &i.to_string();
            format!(
                "{{\"content\": \"{}\", \"source_url\": \"https://syllabus.example/{}\"}}\n",
                body, i
            )
        })
        .collect();
    build_index(tmp.path(), &corpus).await;
    let store = load_store(tmp.path()).await;

    let results = store.retrieve("SFC", 10).await.unwrap();
    assert_eq!(results.len(), 10);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_multi_turn_transcript_alternates() {
    let tmp = TempDir::new().unwrap();
    build_index(tmp.path(), CORPUS).await;
    let answer = ScriptedAnswer::new(false);
    let orch = orchestrator(load_store(tmp.path()).await, answer.clone(), 10);
    let mut session = Session::new();

    orch.handle_turn(&mut session, "SFCとは？").await;
    orch.handle_turn(&mut session, "").await;
    orch.handle_turn(&mut session, "英語の授業は？").await;

    let roles: Vec<Role> = session.messages().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );

    let prompts = answer.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("user: SFCとは？"));
    assert!(prompts[1].contains("assistant: SFCは研究会が魅力です。"));
}

#[tokio::test]
async fn test_transport_failure_keeps_user_message() {
    let tmp = TempDir::new().unwrap();
    build_index(tmp.path(), CORPUS).await;
    let orch = orchestrator(load_store(tmp.path()).await, ScriptedAnswer::new(true), 10);
    let mut session = Session::new();

    match orch.handle_turn(&mut session, "SFCの良さは？").await {
        TurnOutcome::Failed { error } => {
            assert_eq!(error.code(), "answer_service_error");
            assert!(error.to_string().contains("connection refused"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(session.messages(), &[Message::user("SFCの良さは？")]);
}

#[tokio::test]
async fn test_prompt_is_deterministic_across_sessions() {
    let tmp = TempDir::new().unwrap();
    build_index(tmp.path(), CORPUS).await;
    let store = load_store(tmp.path()).await;
    let answer = ScriptedAnswer::new(false);
    let orch = orchestrator(store, answer.clone(), 10);

    for _ in 0..2 {
        let mut session = Session::new();
        orch.handle_turn(&mut session, "SFCのプログラミング").await;
    }

    let prompts = answer.prompts.lock().unwrap();
    assert_eq!(prompts[0], prompts[1]);
}

#[tokio::test]
async fn test_store_refuses_untrusted_index() {
    let tmp = TempDir::new().unwrap();
    build_index(tmp.path(), CORPUS).await;

    let err = VectorStore::load(tmp.path(), Arc::new(KeywordEmbedder), false)
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "store_unavailable");
}
