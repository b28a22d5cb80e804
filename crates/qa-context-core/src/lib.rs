//! # qa-context core
//!
//! I/O-free retrieval logic for qa-context: the corpus store, the
//! embedding index, exact cosine ranking, context assembly, and the
//! [`engine::RetrievalEngine`] that sequences them.
//!
//! This crate performs no filesystem or network access. Loading corpus and
//! index files, concrete embedding providers, and generation backends live
//! in the `qa-context` app crate.
//!
//! ```text
//! query ──▶ QueryEncoder ──▶ Ranker ──▶ assemble ──▶ RetrievalResult
//!                              ▲            ▲
//!                     EmbeddingIndex   CorpusStore
//! ```

pub mod context;
pub mod corpus;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generate;
pub mod index;
pub mod models;
pub mod rank;
