//! # Knowledge Harness Core
//!
//! Shared, I/O-free logic for Knowledge Harness: data models, URL
//! normalization, the classification rule table, the store abstraction,
//! search criteria, and the related-content ranker.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Everything that
//! touches disk or a database lives in the `knowledge-harness` application
//! crate, which implements [`store::Store`] over SQLite.

pub mod classify;
pub mod models;
pub mod normalize;
pub mod related;
pub mod search;
pub mod store;
