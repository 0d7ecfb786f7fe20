//! # condo-rag core
//!
//! Runtime-agnostic logic for tenant-isolated retrieval-augmented question
//! answering: namespace partitioning, document classification, chunking,
//! deduplicating upsert, query classification and expansion, multi-query
//! retrieval with threshold fusion, and answer synthesis.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Backends are reached through the traits in [`embedding`], [`store`],
//! [`synthesize`] and [`audit`]; the `condo-rag` app crate supplies the
//! network implementations.
//!
//! ## Data flow
//!
//! ```text
//! ingest: text ─▶ classify ─▶ chunk ─▶ fingerprint/probe ─▶ embed ─▶ upsert(namespace)
//! query:  question ─▶ classify_query ─▶ expand ─▶ retrieve(namespace) ─▶ synthesize
//! ```

pub mod audit;
pub mod chunk;
pub mod classify;
pub mod embedding;
pub mod error;
pub mod expand;
pub mod fingerprint;
pub mod models;
pub mod namespace;
pub mod pipeline;
pub mod query;
pub mod retrieve;
pub mod store;
pub mod synthesize;
pub mod upsert;
