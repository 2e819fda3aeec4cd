//! # MedInteract
//!
//! Retrieval-augmented medication interaction analysis.
//!
//! MedInteract indexes a local corpus of medical reference documents and,
//! for a structured patient case, retrieves relevant passages and asks a
//! language model to explain potential interactions, citing its sources.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌─────────────┐
//! │  data dir  │──▶│ Extract+Chunk │──▶│ SQLite index │
//! │ PDF/TXT/MD │   │   + Embed     │   │  (vectors)   │
//! └────────────┘   └──────────────┘   └──────┬──────┘
//!                                            │ MMR
//!   PatientCase ──▶ format_query ──▶ retrieve ┴──▶ Ollama ──▶ AnalysisResult
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`engine`] | Initialization lifecycle and analysis orchestration |
//! | [`ingest`] | Data directory scan |
//! | [`extract`] | PDF / DOCX / plain-text page extraction |
//! | [`sqlite_store`] | Durable vector index |
//! | [`embedding`] | Embedding service clients |
//! | [`generation`] | Ollama generation client |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Engine failure categories |
//!
//! Pure logic (models, chunking, MMR, prompt text) lives in the
//! `medinteract-core` crate.

pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod migrate;
pub mod sqlite_store;

pub use engine::{EngineState, IndexReport, InitOutcome, InteractionEngine};
pub use error::EngineError;
