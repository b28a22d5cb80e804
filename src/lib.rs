//! # qa-context
//!
//! Semantic retrieval and context assembly over a question/answer corpus.
//!
//! A user question is embedded, compared by cosine similarity against a
//! precomputed embedding index aligned row-for-row with a CSV corpus, and
//! the top matches are rendered into a numbered context block for an
//! answer-generation model. The best match is returned as the citation.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌────────────┐
//! │ CSV corpus │──▶│  Retrieval   │◀──│ Embedding  │
//! │ (records)  │   │   engine     │   │   index    │
//! └────────────┘   └──────┬───────┘   └────────────┘
//!                         │ encode → rank → assemble
//!              ┌──────────┴──────────┐
//!              ▼                     ▼
//!         ┌──────────┐         ┌──────────┐
//!         │   CLI    │         │   HTTP   │
//!         │ (qactx)  │         │ (axum)   │
//!         └──────────┘         └──────────┘
//! ```
//!
//! The I/O-free pipeline lives in the `qa-context-core` crate; this crate
//! adds file formats, embedding backends, generation backends, the CLI,
//! and the server.
//!
//! ## Quick Start
//!
//! ```bash
//! qactx index build                         # embed the corpus
//! qactx check                               # verify corpus/index alignment
//! qactx search "How many daily prayers?"    # retrieval only
//! qactx ask "How many daily prayers?"       # retrieval + generation
//! qactx serve                               # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`corpus_file`] | CSV corpus loader |
//! | [`index_file`] | safetensors / raw-f32 index reader and writer |
//! | [`embedding`] | Query encoder backends |
//! | [`generate`] | Answer generation backends |
//! | [`engine`] | Startup wiring into a ready engine |
//! | [`ask`] | Retrieval plus generation, REPL |
//! | [`search`] | Retrieval-only command |
//! | [`check`] | Alignment check command |
//! | [`index_cmd`] | Index build command |
//! | [`server`] | HTTP server |

pub mod ask;
pub mod check;
pub mod config;
pub mod corpus_file;
pub mod embedding;
pub mod engine;
pub mod generate;
pub mod index_cmd;
pub mod index_file;
pub mod search;
pub mod server;
