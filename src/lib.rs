//! Retrieval-augmented generation of software test cases from user stories.
//!
//! Prior test cases live in a [`index::VectorIndex`]; a story is cleaned,
//! embedded, matched against that corpus, and the nearest cases go into a
//! prompt for a text model whose reply is parsed into
//! [`record::TestCaseRecord`]s and exported as CSV.

pub mod assistant;
pub mod config;
pub mod embedding;
pub mod error;
pub mod export;
pub mod generator;
pub mod index;
pub mod ingest;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod record;
pub mod retriever;
pub mod text;
pub mod tracker;
pub mod vector_ops;

pub use error::{RagError, Result};
pub use record::TestCaseRecord;
