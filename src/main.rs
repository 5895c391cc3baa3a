use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use casegen::assistant::{Assistant, Turn, DEFAULT_CHAT_OUTPUT};
use casegen::config::{init_tracing, State};
use casegen::embedding::{embed_or_zero, EmbeddingClient};
use casegen::export::export_csv;
use casegen::generator::{ChatClient, Generation};
use casegen::index::{IndexPaths, VectorIndex};
use casegen::ingest::{
    ingest_documents, ingest_rows, read_csv_rows, read_testrail_cases, IngestOptions,
    IngestReport, DEFAULT_CSV_COLUMNS,
};
use casegen::pipeline::TestCasePipeline;
use casegen::prompt::HeadingScheme;
use casegen::provider::ProviderClient;
use casegen::tracker::{AdoClient, WorkItemSource};

#[derive(Parser)]
#[command(name = "casegen")]
#[command(version = "0.1")]
#[command(about = "Generate test cases from user stories with retrieved examples", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate test cases for one story and export them as CSV
    Generate {
        /// Work item id to fetch from the tracker
        story_id: Option<String>,
        /// Read the story from a file instead of the tracker or stdin
        #[arg(long, conflicts_with = "story_id")]
        story_file: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Embed rows of a CSV export into the index
    IngestCsv {
        path: PathBuf,
        /// Comma-separated column names to concatenate
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
    },
    /// Embed a TestRail JSON export into the index
    IngestJson { path: PathBuf },
    /// Print the nearest stored documents for query text read from stdin
    Search {
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Line-oriented assistant over stdin
    Chat,
    Config,
}

fn provider(state: &State) -> Result<ProviderClient> {
    let key = state.require_api_key()?;
    ProviderClient::new(key, &state.api_base_url, state.request_timeout)
        .context("failed to build the provider HTTP client")
}

fn embedder(state: &State) -> Result<EmbeddingClient> {
    Ok(EmbeddingClient::new(
        provider(state)?,
        &state.embedding_model,
        state.dimensions,
    ))
}

fn chat_client(state: &State) -> Result<ChatClient> {
    Ok(ChatClient::new(provider(state)?, &state.generation_model))
}

fn tracker(state: &State) -> Result<AdoClient> {
    let org_url = state.ado_org_url.as_deref().unwrap_or_default();
    let username = state.ado_username.as_deref().unwrap_or_default();
    let pat = state.ado_pat.as_deref().unwrap_or_default();
    AdoClient::new(org_url, username, pat, state.request_timeout)
        .context("tracker is not configured")
}

fn open_index(state: &State) -> Result<VectorIndex> {
    let paths = IndexPaths::new(&state.index_path, &state.metadata_path);
    VectorIndex::open(paths, state.dimensions).with_context(|| {
        format!(
            "failed to initialize index at '{}'",
            state.index_path.display()
        )
    })
}

fn ingest_options(state: &State) -> IngestOptions {
    IngestOptions {
        workers: state.ingest_workers,
        delay: state.ingest_delay,
        batch_size: state.ingest_batch_size,
    }
}

fn finish_ingest(index: &VectorIndex, report: &IngestReport) -> Result<()> {
    index.save().context("failed to save index")?;
    info!(
        "Ingestion complete: {} added, {} empty, {} failed; index holds {} documents",
        report.added,
        report.skipped_empty,
        report.failed,
        index.len()
    );
    println!("{}", serde_json::to_string(report)?);
    Ok(())
}

fn read_story(
    state: &State,
    story_id: Option<&str>,
    story_file: Option<&Path>,
) -> Result<String> {
    if let Some(id) = story_id {
        let item = tracker(state)?
            .fetch_work_item(id)?
            .with_context(|| format!("failed to retrieve user story {}", id))?;
        return Ok(item.story_text());
    }
    if let Some(path) = story_file {
        return fs::read_to_string(path)
            .with_context(|| format!("failed to read story file '{}'", path.display()));
    }
    let mut story = String::new();
    io::stdin().read_to_string(&mut story)?;
    Ok(story)
}

fn generate_command(
    state: &State,
    story_id: Option<String>,
    story_file: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let story = read_story(state, story_id.as_deref(), story_file.as_deref())?;
    if story.trim().is_empty() {
        anyhow::bail!("no user story provided");
    }

    let index = open_index(state)?;
    let embedder = embedder(state)?;
    let generator = chat_client(state)?;
    let pipeline = TestCasePipeline::new(
        &embedder,
        &index,
        &generator,
        state.heading_scheme,
        state.top_k,
        state.strip_stop_words,
    );

    let outcome = pipeline.run(&story);
    debug!("Prompt:\n{}", outcome.prompt);
    if let Generation::Failed(_) = outcome.generation {
        anyhow::bail!("{}", outcome.generation);
    }
    if outcome.records.is_empty() {
        warn!("No test cases could be parsed from the model output");
        println!("{}", outcome.generation);
        return Ok(());
    }

    let destination = output.unwrap_or_else(|| state.output_csv.clone());
    let written = export_csv(&outcome.records, &destination)
        .with_context(|| format!("failed to write '{}'", destination.display()))?;
    println!(
        "{} test cases written to '{}' ({} context documents)",
        written,
        destination.display(),
        outcome.context_count
    );
    Ok(())
}

fn ingest_csv_command(state: &State, path: &Path, columns: Option<Vec<String>>) -> Result<()> {
    let columns = columns
        .unwrap_or_else(|| DEFAULT_CSV_COLUMNS.iter().map(|c| c.to_string()).collect());
    let rows = read_csv_rows(path).with_context(|| format!("failed to read '{}'", path.display()))?;

    let mut index = open_index(state)?;
    let embedder = embedder(state)?;
    let report = ingest_rows(&rows, &columns, &embedder, &mut index, &ingest_options(state))?;
    finish_ingest(&index, &report)
}

fn ingest_json_command(state: &State, path: &Path) -> Result<()> {
    let cases =
        read_testrail_cases(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    let documents: Vec<String> = cases.iter().map(|case| case.document_text()).collect();

    let mut index = open_index(state)?;
    let embedder = embedder(state)?;
    let report = ingest_documents(&documents, &embedder, &mut index, &ingest_options(state))?;
    finish_ingest(&index, &report)
}

fn search_command(state: &State, top_k: Option<usize>) -> Result<()> {
    debug!("Starting search");
    let mut query = String::new();
    io::stdin().read_to_string(&mut query)?;
    let top_k = top_k.unwrap_or(state.top_k);

    let index = open_index(state)?;
    let embedder = embedder(state)?;
    let vector = embed_or_zero(&embedder, query.trim());
    let hits = index.search_hits(&vector, top_k);
    let actual = hits.len();

    let output = serde_json::json!({
        "query": query.trim(),
        "index_document_count": index.len(),
        "results": hits,
        "actual_results_count": actual,
        "requested_results_count": top_k,
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn chat_command(state: &State) -> Result<()> {
    let index = open_index(state)?;
    let embedder = embedder(state)?;
    let generator = chat_client(state)?;
    let tracker = match tracker(state) {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("Test case generation is unavailable in chat: {:#}", e);
            None
        }
    };
    let pipeline = TestCasePipeline::new(
        &embedder,
        &index,
        &generator,
        HeadingScheme::Fields,
        state.top_k,
        state.strip_stop_words,
    );
    let assistant = Assistant::new(
        tracker.as_ref().map(|t| t as &dyn WorkItemSource),
        &pipeline,
        &generator,
        DEFAULT_CHAT_OUTPUT,
    );

    println!("Chat mode: type a request, or 'exit' to quit.");
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match assistant.respond(&line) {
            Turn::Exit => {
                println!("Goodbye!");
                break;
            }
            Turn::Reply(reply) => {
                writeln!(stdout, "Assistant: {}", reply)?;
                stdout.flush()?;
            }
        }
    }
    Ok(())
}

fn config_command(state: &State) -> Result<()> {
    state.print_config();
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let state = State::new()?;
    init_tracing(state.debug);

    match args.command {
        Commands::Generate {
            story_id,
            story_file,
            output,
        } => generate_command(&state, story_id, story_file, output)?,
        Commands::IngestCsv { path, columns } => ingest_csv_command(&state, &path, columns)?,
        Commands::IngestJson { path } => ingest_json_command(&state, &path)?,
        Commands::Search { top_k } => search_command(&state, top_k)?,
        Commands::Chat => chat_command(&state)?,
        Commands::Config => config_command(&state)?,
    }
    Ok(())
}
