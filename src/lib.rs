//! # Knowledge Harness
//!
//! A local knowledge base for documents discovered at arbitrary URLs.
//!
//! Each URL is normalized and classified into a content type, which decides
//! where its record lives on disk. Records are written three ways: a pretty
//! JSON file, a line in an append-only flat index, and a row in SQLite with
//! its keywords in a join table. The database backs search and the
//! keyword-overlap ranker that finds related records.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌─────────────────────┐
//! │    URL     │──▶│ Classifier  │──▶│    Content Store     │
//! │ + content  │   │ type + path │   │ JSON │ index │ SQLite│
//! └────────────┘   └─────────────┘   └──────────┬──────────┘
//!                                               │
//!                               ┌───────────────┤
//!                               ▼               ▼
//!                          ┌──────────┐   ┌──────────┐
//!                          │  Search  │   │ Related  │
//!                          └──────────┘   └──────────┘
//! ```
//!
//! The pure pieces (models, URL rules, search criteria, the ranker) live in
//! `knowledge-harness-core`; this crate adds the filesystem, SQLite, and the
//! `kb` command line.
//!
//! ## Quick Start
//!
//! ```bash
//! kb init
//! kb ingest https://github.com/rust-lang/rust --content-file README.md --keyword rust
//! kb search --keyword rust
//! kb related 1
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`classifier`] | URL classification, capture timestamps, record paths |
//! | [`index`] | Append-only flat index |
//! | [`sqlite_store`] | Relational record store |
//! | [`content_store`] | Three-way record writes |
//! | [`ingest`] | Ingestion and directory loading |
//! | [`get`] | Record retrieval |
//! | [`edit`] | Record update and delete |
//! | [`search`] | Search and recent records |
//! | [`related`] | Related-record ranking |
//! | [`stats`] | Store statistics |

pub mod classifier;
pub mod config;
pub mod content_store;
pub mod db;
pub mod edit;
pub mod get;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod related;
pub mod search;
pub mod sqlite_store;
pub mod stats;
