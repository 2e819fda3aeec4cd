//! The interaction engine: the only public entry point of MedInteract.
//!
//! The engine owns the initialization lifecycle and the per-request
//! analysis flow:
//!
//! ```text
//! initialize():  data dir ─▶ ingest ─▶ chunk ─▶ dedup ─▶ embed ─▶ store ─▶ flush
//! analyze(case): format query ─▶ MMR retrieve ─▶ generate ─▶ citations
//! ```
//!
//! # Lifecycle
//!
//! ```text
//!                 initialize() ok
//! Uninitialized ─────────────────▶ Ready
//!       │                            ▲
//!       │ initialize() fails         │ initialize() ok
//!       ▼                            │
//!     Failed(reason) ────────────────┘
//! ```
//!
//! `initialize` in `Ready` returns the cached outcome and does no work.
//! `reinitialize` re-runs the pipeline from any state. `analyze` outside
//! `Ready` makes exactly one `initialize` attempt before giving up.
//!
//! Neither `initialize` nor `analyze` returns `Err`: failures are reported
//! in [`InitOutcome`] and [`AnalysisResult`] respectively.

use anyhow::anyhow;
use serde::Serialize;
use tracing::{debug, info, warn};

use medinteract_core::chunk::chunk_documents;
use medinteract_core::embedding::EmbeddingProvider;
use medinteract_core::generation::{GenerationProvider, GenerationRequest};
use medinteract_core::models::{AnalysisResult, Chunk, Citation, PatientCase};
use medinteract_core::prompt::format_query;
use medinteract_core::retrieve::retrieve;
use medinteract_core::store::{IndexEntry, Store};

use crate::config::{self, Config};
use crate::embedding::create_provider;
use crate::error::EngineError;
use crate::generation::OllamaGenerator;
use crate::ingest::load_documents;
use crate::sqlite_store::SqliteStore;

/// Message returned by a successful `initialize`.
pub const SUCCESS_MESSAGE: &str = "System initialized successfully!";

/// Prefix of the error returned when lazy initialization fails inside `analyze`.
pub const NOT_INITIALIZED_PREFIX: &str = "System not initialized.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Ready,
    Failed(String),
}

/// Counts from one run of the index pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Pages extracted from the data directory.
    pub documents: usize,
    /// Files that were skipped because they could not be loaded.
    pub failed_files: usize,
    /// Chunks produced from the extracted pages.
    pub chunks: usize,
    /// Chunks embedded and added to the index by this run.
    pub inserted: usize,
    /// Chunks already present in the index.
    pub skipped_existing: usize,
    /// Index size after the run.
    pub total_entries: usize,
}

/// Result of `initialize`/`reinitialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitOutcome {
    pub ok: bool,
    pub message: String,
    pub report: Option<IndexReport>,
}

pub struct InteractionEngine {
    config: Config,
    store: Box<dyn Store>,
    embedder: Box<dyn EmbeddingProvider>,
    generator: Box<dyn GenerationProvider>,
    state: EngineState,
    last_report: Option<IndexReport>,
}

impl InteractionEngine {
    /// Assemble an engine from explicit collaborators.
    pub fn new(
        config: Config,
        store: Box<dyn Store>,
        embedder: Box<dyn EmbeddingProvider>,
        generator: Box<dyn GenerationProvider>,
    ) -> Self {
        Self {
            config,
            store,
            embedder,
            generator,
            state: EngineState::Uninitialized,
            last_report: None,
        }
    }

    /// Build the production engine: SQLite index, configured embedding
    /// provider, Ollama generation.
    pub fn from_config(config: Config) -> Result<Self, EngineError> {
        config::validate(&config).map_err(EngineError::Config)?;
        let store = SqliteStore::new(config.index.path.clone());
        let embedder = create_provider(&config.embedding).map_err(EngineError::Config)?;
        let generator = OllamaGenerator::new(config.generation.clone())
            .map_err(|e| EngineError::Config(e.into()))?;
        Ok(Self::new(config, Box::new(store), embedder, Box::new(generator)))
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Bring the engine to `Ready`, building or extending the index.
    ///
    /// A no-op returning the cached outcome when already `Ready`.
    pub async fn initialize(&mut self) -> InitOutcome {
        if self.is_ready() {
            return InitOutcome {
                ok: true,
                message: SUCCESS_MESSAGE.to_string(),
                report: self.last_report.clone(),
            };
        }
        self.run_initialize().await
    }

    /// Re-run ingestion and indexing regardless of the current state.
    ///
    /// Additive: chunks already in the index are skipped, new ones added.
    pub async fn reinitialize(&mut self) -> InitOutcome {
        self.run_initialize().await
    }

    /// Analyze a patient case against the indexed literature.
    pub async fn analyze(&mut self, case: PatientCase) -> AnalysisResult {
        if !self.is_ready() {
            let outcome = self.initialize().await;
            if !outcome.ok {
                return AnalysisResult::error(format!(
                    "{} {}",
                    NOT_INITIALIZED_PREFIX, outcome.message
                ));
            }
        }

        match self.run_analysis(&case).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "analysis failed");
                AnalysisResult::error(e.analyze_message())
            }
        }
    }

    async fn run_initialize(&mut self) -> InitOutcome {
        match self.build_index().await {
            Ok(report) => {
                info!(
                    inserted = report.inserted,
                    total = report.total_entries,
                    "system initialized"
                );
                self.state = EngineState::Ready;
                self.last_report = Some(report.clone());
                InitOutcome {
                    ok: true,
                    message: SUCCESS_MESSAGE.to_string(),
                    report: Some(report),
                }
            }
            Err(e) => {
                let message = e.init_message();
                warn!(error = %e, "initialization failed");
                self.state = EngineState::Failed(message.clone());
                InitOutcome {
                    ok: false,
                    message,
                    report: None,
                }
            }
        }
    }

    async fn build_index(&self) -> Result<IndexReport, EngineError> {
        let ingest = load_documents(&self.config.data.dir, &self.config.ingest)
            .map_err(EngineError::Ingest)?;
        let chunks = chunk_documents(
            &ingest.documents,
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        );
        info!(
            files = ingest.files_seen,
            failed = ingest.failures.len(),
            pages = ingest.documents.len(),
            chunks = chunks.len(),
            "ingestion finished"
        );

        let mut report = IndexReport {
            documents: ingest.documents.len(),
            failed_files: ingest.failures.len(),
            chunks: chunks.len(),
            ..Default::default()
        };

        let existing = self.store.count().await.map_err(EngineError::Index)?;
        if existing == 0 {
            if chunks.is_empty() {
                return Err(EngineError::NoData);
            }
            info!(chunks = chunks.len(), "building new index");
        } else {
            self.check_index_model().await?;
            info!(entries = existing, "opening existing index");
        }

        let fresh = self.fresh_chunks(chunks).await?;
        report.skipped_existing = report.chunks - fresh.len();
        report.inserted = self.embed_and_insert(&fresh).await?;

        self.store.flush().await.map_err(EngineError::Index)?;
        report.total_entries = self.store.count().await.map_err(EngineError::Index)?;

        if existing > 0 {
            info!(added = report.inserted, "extended existing index");
        }
        Ok(report)
    }

    async fn check_index_model(&self) -> Result<(), EngineError> {
        let current = self.embedder.model_name();
        match self.store.embedding_model().await.map_err(EngineError::Index)? {
            Some(built_with) if built_with != current => Err(EngineError::Index(anyhow!(
                "index was built with embedding model '{}' but '{}' is configured",
                built_with,
                current
            ))),
            _ => Ok(()),
        }
    }

    /// Drop chunks already in the index, and repeats within this run.
    async fn fresh_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>, EngineError> {
        let hashes: Vec<String> = chunks.iter().map(|c| c.hash.clone()).collect();
        let mut seen = self
            .store
            .existing_hashes(&hashes)
            .await
            .map_err(EngineError::Index)?;
        Ok(chunks
            .into_iter()
            .filter(|c| seen.insert(c.hash.clone()))
            .collect())
    }

    async fn embed_and_insert(&self, chunks: &[Chunk]) -> Result<usize, EngineError> {
        let dims = self.embedder.dims();
        let model = self.embedder.model_name().to_string();
        let mut inserted = 0;
        let mut processed = 0;

        for batch in chunks.chunks(self.config.embedding.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(EngineError::Embedding)?;
            if vectors.len() != batch.len() {
                return Err(EngineError::Index(anyhow!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            let mut entries = Vec::with_capacity(batch.len());
            for (chunk, vector) in batch.iter().zip(vectors) {
                if vector.len() != dims {
                    return Err(EngineError::Index(anyhow!(
                        "embedding has {} dimensions, expected {}",
                        vector.len(),
                        dims
                    )));
                }
                entries.push(IndexEntry {
                    chunk: chunk.clone(),
                    vector,
                });
            }

            inserted += self
                .store
                .insert(&entries, &model)
                .await
                .map_err(EngineError::Index)?;
            processed += batch.len();
            debug!(inserted, remaining = chunks.len() - processed, "indexed batch");
        }

        Ok(inserted)
    }

    async fn run_analysis(&self, case: &PatientCase) -> Result<AnalysisResult, EngineError> {
        let query = format_query(case);
        let passages = retrieve(
            self.store.as_ref(),
            self.embedder.as_ref(),
            &query,
            &self.config.retrieval.params(),
        )
        .await
        .map_err(|e| EngineError::Index(e.context("retrieval failed")))?;
        debug!(passages = passages.len(), "retrieved context");

        let generation = self
            .generator
            .generate(&GenerationRequest::new(query, passages))
            .await
            .map_err(EngineError::Generation)?;

        let excerpt_chars = self.config.engine.excerpt_chars;
        let sources = generation
            .cited
            .iter()
            .map(|p| Citation::from_passage(p, excerpt_chars))
            .collect();

        Ok(AnalysisResult::Analysis {
            analysis: generation.text,
            sources,
        })
    }
}

impl std::fmt::Debug for InteractionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionEngine")
            .field("state", &self.state)
            .field("embedding_model", &self.embedder.model_name())
            .field("generation_model", &self.generator.model_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use medinteract_core::generation::Generation;
    use medinteract_core::models::{Medication, Passage};
    use medinteract_core::store::memory::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct CountingEmbedder {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl GenerationProvider for EchoGenerator {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Generation> {
            Ok(Generation {
                text: format!("{} passages", request.passages.len()),
                cited: request.passages.clone(),
            })
        }
    }

    fn engine_for(dir: &TempDir, calls: Arc<AtomicUsize>) -> InteractionEngine {
        let mut config = Config::default();
        config.data.dir = dir.path().join("data");
        InteractionEngine::new(
            config,
            Box::new(InMemoryStore::new()),
            Box::new(CountingEmbedder { calls }),
            Box::new(EchoGenerator),
        )
    }

    #[tokio::test]
    async fn test_initialize_is_cached_once_ready() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("data")).unwrap();
        std::fs::write(tmp.path().join("data").join("ref.txt"), "Aspirin thins blood.").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut engine = engine_for(&tmp, calls.clone());

        let first = engine.initialize().await;
        assert!(first.ok, "{}", first.message);
        assert_eq!(first.message, SUCCESS_MESSAGE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        std::fs::write(tmp.path().join("data").join("more.txt"), "Ibuprofen and kidneys.").unwrap();
        let second = engine.initialize().await;
        assert!(second.ok);
        assert_eq!(second.report, first.report);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let forced = engine.reinitialize().await;
        let report = forced.report.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped_existing, 1);
        assert_eq!(report.total_entries, 2);
    }

    #[tokio::test]
    async fn test_failed_state_records_reason() {
        let tmp = TempDir::new().unwrap();
        let mut engine = engine_for(&tmp, Arc::new(AtomicUsize::new(0)));

        let outcome = engine.initialize().await;
        assert!(!outcome.ok);
        assert_eq!(*engine.state(), EngineState::Failed(outcome.message.clone()));

        let result = engine
            .analyze(PatientCase {
                new_medications: vec![Medication::new("Warfarin", "5mg")],
                ..Default::default()
            })
            .await;
        assert!(result.error_message().unwrap().starts_with(NOT_INITIALIZED_PREFIX));
    }

    #[tokio::test]
    async fn test_citations_follow_generator_order() {
        struct ReversingGenerator {
            received: Arc<Mutex<Vec<Passage>>>,
        }

        #[async_trait]
        impl GenerationProvider for ReversingGenerator {
            fn model_name(&self) -> &str {
                "reverse"
            }
            async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Generation> {
                *self.received.lock().unwrap() = request.passages.clone();
                let mut cited = request.passages.clone();
                cited.reverse();
                Ok(Generation {
                    text: "ok".to_string(),
                    cited,
                })
            }
        }

        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("a.txt"), "a".repeat(10)).unwrap();
        std::fs::write(data.join("b.txt"), "b".repeat(20)).unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let mut config = Config::default();
        config.data.dir = data;
        let mut engine = InteractionEngine::new(
            config,
            Box::new(InMemoryStore::new()),
            Box::new(CountingEmbedder {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(ReversingGenerator {
                received: received.clone(),
            }),
        );

        let result = engine.analyze(PatientCase::default()).await;
        let AnalysisResult::Analysis { sources, .. } = result else {
            panic!("expected analysis, got {:?}", result);
        };
        let received = received.lock().unwrap().clone();
        assert_eq!(sources.len(), 2);
        assert_eq!(received.len(), 2);
        assert_eq!(sources[0].excerpt, received[1].text);
        assert_eq!(sources[1].excerpt, received[0].text);
    }

    #[tokio::test]
    async fn test_embed_and_insert_counts_only_new_rows() {
        use medinteract_core::chunk::chunk_text;
        use medinteract_core::store::IndexEntry;

        let tmp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut engine = engine_for(&tmp, calls.clone());
        engine.config.embedding.batch_size = 1;

        let known = chunk_text("a.txt", 0, "Digoxin and amiodarone.", 1000, 0).remove(0);
        let fresh = chunk_text("b.txt", 0, "Statins and grapefruit.", 1000, 0).remove(0);
        engine
            .store
            .insert(
                &[IndexEntry {
                    chunk: known.clone(),
                    vector: vec![1.0, 1.0],
                }],
                "counting",
            )
            .await
            .unwrap();

        let inserted = engine.embed_and_insert(&[known, fresh]).await.unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.store.count().await.unwrap(), 2);
    }
}
