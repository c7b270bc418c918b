//! # Local Brain
//!
//! A personal retrieval index over your past chat conversations, served
//! to a local language model so its answers are grounded in what you
//! already discussed.
//!
//! Two sources feed the index: a bulk conversation export, rebuilt in
//! full on demand, and a live interaction log that grows with every
//! answered prompt and is ingested incrementally behind a persisted
//! cursor.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Export tree  │──▶│  Pipeline   │──▶│  SQLite  │
//! │ Live log     │   │ Chunk+Embed │   │  index   │
//! └──────────────┘   └─────────────┘   └────┬─────┘
//!        ▲                                  │ nearest neighbors
//!        │ interaction log                  ▼
//!   ┌────┴─────┐                     ┌──────────────┐
//!   │ Ask flow │◀────────────────────│   Context    │
//!   │ CLI/HTTP │                     │  assembler   │
//!   └──────────┘                     └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! brain init                         # create the index
//! brain rebuild                      # index the bulk export
//! brain ask "how did I set up NFS?"  # retrieval-augmented answer
//! brain ingest                       # index new live interactions
//! brain serve                        # OpenAI-compatible HTTP service
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error kinds per boundary |
//! | [`chunk`] | Line-boundary text chunking |
//! | [`connector_export`] | Bulk export loader |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector index trait and backends |
//! | [`cursor`] | Persisted live-ingest cursor |
//! | [`ingest`] | Rebuild and incremental ingestion |
//! | [`context`] | Context-window assembly |
//! | [`chat`] | Chat completion backend |
//! | [`interaction_log`] | JSONL log of answered prompts |
//! | [`ask`] | Retrieval-augmented chat turn |
//! | [`server`] | HTTP service |
//! | [`watch`] | Export watcher |
//! | [`stats`] | Index statistics |
//! | [`progress`] | Ingestion progress on stderr |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod ask;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod connector_export;
pub mod context;
pub mod cursor;
pub mod db;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod interaction_log;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod server;
pub mod stats;
pub mod store;
pub mod watch;
