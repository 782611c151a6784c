//! # RUC Harness
//!
//! Daily ingestion of the published taxpayer (RUC) registry into SQLite,
//! with a small read-only HTTP API.
//!
//! The registry is published as ten zip archives (`ruc0.zip` .. `ruc9.zip`),
//! each holding pipe-delimited text files. A run discovers the archive URLs,
//! downloads each with a fixed retry budget, validates and extracts it, and
//! streams every line into batched, transactional upserts keyed by tax id.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐   ┌──────────┐
//! │   Fetcher    │──▶│  Directory   │──▶│ Batch Writer  │──▶│  SQLite  │
//! │ discover/zip │   │  Ingestor    │   │ (1000 / tx)   │   │taxpayers │
//! └──────────────┘   └──────────────┘   └───────────────┘   └────┬─────┘
//!        ▲                                                       │
//!        │ run_once / try_run_once                               ▼
//! ┌──────────────┐                                         ┌──────────┐
//! │   Pipeline   │◀── startup + daily schedule             │ read API │
//! └──────────────┘                                         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ruc init                  # create database
//! ruc sync                  # one full download + ingest run
//! ruc get 80012345          # look up a taxpayer
//! ruc serve                 # read API + daily schedule
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Fetch and parse error taxonomy |
//! | [`parser`] | Pipe-delimited line parsing |
//! | [`store`] | Record store trait, SQLite and in-memory backends |
//! | [`batch`] | Buffered transactional writes |
//! | [`ingest`] | Streaming directory ingestion |
//! | [`fetch`] | Discovery, download with retry, extraction |
//! | [`pipeline`] | Run orchestration and overlap guard |
//! | [`schedule`] | Periodic trigger |
//! | [`server`] | Read-only HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod batch;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod schedule;
pub mod server;
pub mod stats;
pub mod store;
