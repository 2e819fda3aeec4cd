//! # MedInteract Core
//!
//! Shared, I/O-free logic for MedInteract: data models, chunking, the
//! vector store abstraction, diversity-aware retrieval, the prompt
//! contract, and the traits describing the embedding and generation
//! services.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network code.
//! Everything that talks to the outside world lives in the `medinteract`
//! application crate and plugs in through the traits defined here.

pub mod chunk;
pub mod embedding;
pub mod generation;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod store;
