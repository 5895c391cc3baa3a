use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Number;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::retriever::preview;

/// Header-keyed row of a tabular source.
pub type SourceRow = HashMap<String, String>;

pub const DEFAULT_CSV_COLUMNS: [&str; 6] = [
    "Title",
    "Plan",
    "Run",
    "Steps",
    "Steps (Expected Result)",
    "Steps (Step)",
];

/// TestRail documents are cut to this many characters before embedding.
pub const MAX_DOCUMENT_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Concurrent embedding calls.
    pub workers: usize,
    /// Pause each worker takes after every embedding call.
    pub delay: Duration,
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            delay: Duration::from_millis(200),
            batch_size: 100,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub added: usize,
    pub skipped_empty: usize,
    pub failed: usize,
}

/// Values of `columns` joined by single spaces; blank or missing columns
/// contribute nothing.
pub fn concatenate_columns<S: AsRef<str>>(row: &SourceRow, columns: &[S]) -> String {
    columns
        .iter()
        .filter_map(|column| row.get(column.as_ref()))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Embeds the configured columns of every row and adds them to `index`, with
/// the concatenated text as metadata. Rows that fail are logged and skipped.
pub fn ingest_rows<S: AsRef<str>>(
    rows: &[SourceRow],
    columns: &[S],
    embedder: &dyn Embedder,
    index: &mut VectorIndex,
    options: &IngestOptions,
) -> Result<IngestReport> {
    let mut documents = Vec::with_capacity(rows.len());
    let mut skipped_empty = 0;
    for row in rows {
        let text = concatenate_columns(row, columns);
        if text.is_empty() {
            skipped_empty += 1;
            continue;
        }
        documents.push(text);
    }
    if skipped_empty > 0 {
        debug!("Skipped {} rows with no text in the selected columns", skipped_empty);
    }

    let mut report = ingest_documents(&documents, embedder, index, options)?;
    report.skipped_empty += skipped_empty;
    Ok(report)
}

/// Embeds each document on a bounded worker pool, then appends the results to
/// `index` from the calling thread in input order.
pub fn ingest_documents(
    documents: &[String],
    embedder: &dyn Embedder,
    index: &mut VectorIndex,
    options: &IngestOptions,
) -> Result<IngestReport> {
    if !index.is_initialized() {
        return Err(RagError::NotInitialized);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers.max(1))
        .build()
        .map_err(|e| RagError::Config(format!("failed to build ingestion pool: {}", e)))?;

    let start = Instant::now();
    let mut report = IngestReport::default();
    let batch_size = options.batch_size.max(1);

    for (batch_no, batch) in documents.chunks(batch_size).enumerate() {
        debug!(
            "Processing batch {}: documents {} to {}",
            batch_no + 1,
            batch_no * batch_size,
            batch_no * batch_size + batch.len() - 1
        );

        let embedded: Vec<Result<Vec<Number>>> = pool.install(|| {
            batch
                .par_iter()
                .map(|text| {
                    let result = embedder.embed(text);
                    if !options.delay.is_zero() {
                        thread::sleep(options.delay);
                    }
                    result
                })
                .collect()
        });

        for (text, result) in batch.iter().zip(embedded) {
            let vector = match result {
                Ok(vector) => vector,
                Err(e) => {
                    error!("Error generating embedding for '{}': {}", preview(text, 50), e);
                    report.failed += 1;
                    continue;
                }
            };
            match index.add(&vector, text.as_str()) {
                Ok(offset) => {
                    debug!("Added document {}: {}", offset, preview(text, 50));
                    report.added += 1;
                }
                Err(e) => {
                    error!("Error adding '{}' to the index: {}", preview(text, 50), e);
                    report.failed += 1;
                }
            }
        }
    }

    info!(
        "Ingestion finished in {:?}: {} added, {} failed",
        start.elapsed(),
        report.added,
        report.failed
    );
    Ok(report)
}

/// Reads a headed CSV file into rows. Malformed records are logged and skipped.
pub fn read_csv_rows(path: &Path) -> Result<Vec<SourceRow>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping malformed CSV record {}: {}", line + 1, e);
                continue;
            }
        };
        let row: SourceRow = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(row);
    }
    info!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestRailStep {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub expected: Option<String>,
    #[serde(default)]
    pub additional_info: Option<String>,
    #[serde(default)]
    pub refs: Option<String>,
}

/// The subset of a TestRail case export that feeds the index.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestRailCase {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub custom_testcase_description: Option<String>,
    #[serde(default)]
    pub custom_preconds: Option<String>,
    #[serde(default)]
    pub custom_steps_separated: Option<Vec<TestRailStep>>,
}

impl TestRailCase {
    pub fn document_text(&self) -> String {
        let field = |v: &Option<String>| v.clone().unwrap_or_default();

        let mut text = format!(
            "Title: {}\nDescription: {}\nPreconditions: {}\n",
            field(&self.title),
            field(&self.custom_testcase_description),
            field(&self.custom_preconds)
        );
        for (i, step) in self.custom_steps_separated.iter().flatten().enumerate() {
            text.push_str(&format!(
                "Step {} Content: {}\nExpected: {}\nAdditional Info: {}\nRefs: {}\n",
                i + 1,
                field(&step.content),
                field(&step.expected),
                field(&step.additional_info),
                field(&step.refs)
            ));
        }

        let cut = text.char_indices().nth(MAX_DOCUMENT_CHARS).map(|(i, _)| i);
        if let Some(cut) = cut {
            debug!("Trimmed case {:?} to {} characters", self.id, MAX_DOCUMENT_CHARS);
            text.truncate(cut);
        }
        text
    }
}

pub fn read_testrail_cases(path: &Path) -> Result<Vec<TestRailCase>> {
    let file = File::open(path)?;
    let cases: Vec<TestRailCase> = serde_json::from_reader(BufReader::new(file))?;
    info!("Loaded {} test cases from {}", cases.len(), path.display());
    Ok(cases)
}
