use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::prompt::HeadingScheme;

pub type Number = f32;

pub const EPSILON: f32 = 1e-6;

pub const DEFAULT_DIMENSIONS: usize = 1536;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Deserialize)]
pub struct CasegenConfig {
    pub index_path: Option<String>,
    pub metadata_path: Option<String>,
    pub dimensions: Option<usize>,
    pub top_k: Option<usize>,
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    pub embedding_model: Option<String>,
    pub generation_model: Option<String>,
    pub heading_scheme: Option<String>,
    pub strip_stop_words: Option<bool>,
    pub output_csv: Option<String>,
    pub ingest_workers: Option<usize>,
    pub ingest_delay_ms: Option<u64>,
    pub ingest_batch_size: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub debug: Option<bool>,
    pub ado_org_url: Option<String>,
    pub ado_username: Option<String>,
    pub ado_pat: Option<String>,
}

impl CasegenConfig {
    pub fn try_from(config: &Config) -> Result<Self, ConfigError> {
        Ok(CasegenConfig {
            index_path: config.get("index_path").ok(),
            metadata_path: config.get("metadata_path").ok(),
            dimensions: config.get("dimensions").ok(),
            top_k: config.get("top_k").ok(),
            api_key: config.get("api_key").ok(),
            api_base_url: config.get("api_base_url").ok(),
            embedding_model: config.get("embedding_model").ok(),
            generation_model: config.get("generation_model").ok(),
            heading_scheme: config.get("heading_scheme").ok(),
            strip_stop_words: config.get("strip_stop_words").ok(),
            output_csv: config.get("output_csv").ok(),
            ingest_workers: config.get("ingest_workers").ok(),
            ingest_delay_ms: config.get("ingest_delay_ms").ok(),
            ingest_batch_size: config.get("ingest_batch_size").ok(),
            request_timeout_secs: config.get("request_timeout_secs").ok(),
            debug: config.get("debug").ok(),
            ado_org_url: config.get("ado_org_url").ok(),
            ado_username: config.get("ado_username").ok(),
            ado_pat: config.get("ado_pat").ok(),
        })
    }
}

/// Resolved process configuration.
#[derive(Debug, Clone)]
pub struct State {
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
    pub dimensions: usize,
    pub top_k: usize,
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub heading_scheme: HeadingScheme,
    pub strip_stop_words: bool,
    pub output_csv: PathBuf,
    pub ingest_workers: usize,
    pub ingest_delay: Duration,
    pub ingest_batch_size: usize,
    pub request_timeout: Duration,
    pub debug: bool,
    pub ado_org_url: Option<String>,
    pub ado_username: Option<String>,
    pub ado_pat: Option<String>,
}

impl State {
    pub fn new() -> Result<Self> {
        let mut config = Config::default();
        #[allow(deprecated)]
        {
            config.merge(ConfigFile::with_name("casegen_config").required(false))?;
            config.merge(Environment::with_prefix("CASEGEN"))?;
        }

        let casegen_config = CasegenConfig::try_from(&config)?;
        Self::resolve(casegen_config)
    }

    fn resolve(cfg: CasegenConfig) -> Result<Self> {
        let dimensions = cfg.dimensions.unwrap_or(DEFAULT_DIMENSIONS);
        if dimensions == 0 {
            anyhow::bail!("CASEGEN_DIMENSIONS must be greater than zero.");
        }

        let top_k = cfg.top_k.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 {
            anyhow::bail!("CASEGEN_TOP_K must be greater than zero.");
        }

        let heading_scheme = match cfg.heading_scheme {
            Some(raw) => raw
                .parse::<HeadingScheme>()
                .map_err(anyhow::Error::msg)
                .context("invalid CASEGEN_HEADING_SCHEME")?,
            None => HeadingScheme::Headings,
        };

        let api_key = cfg
            .api_key
            .or_else(|| env::var("OPENAI_API_KEY").ok())
            .filter(|key| !key.trim().is_empty());

        let debug = cfg.debug.unwrap_or_else(|| legacy_flag("DEBUG_MODE"));

        Ok(Self {
            index_path: PathBuf::from(
                cfg.index_path
                    .unwrap_or_else(|| "faiss_index_file.index".to_string()),
            ),
            metadata_path: PathBuf::from(
                cfg.metadata_path
                    .unwrap_or_else(|| "faiss_metadata.json".to_string()),
            ),
            dimensions,
            top_k,
            api_key,
            api_base_url: cfg
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            embedding_model: cfg
                .embedding_model
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            generation_model: cfg.generation_model.unwrap_or_else(|| "gpt-4o".to_string()),
            heading_scheme,
            strip_stop_words: cfg.strip_stop_words.unwrap_or(true),
            output_csv: PathBuf::from(
                cfg.output_csv
                    .unwrap_or_else(|| "my_test_cases.csv".to_string()),
            ),
            ingest_workers: cfg.ingest_workers.unwrap_or(4).max(1),
            ingest_delay: Duration::from_millis(cfg.ingest_delay_ms.unwrap_or(200)),
            ingest_batch_size: cfg.ingest_batch_size.unwrap_or(100).max(1),
            request_timeout: Duration::from_secs(cfg.request_timeout_secs.unwrap_or(60)),
            debug,
            ado_org_url: cfg.ado_org_url.or_else(|| env::var("ADO_ORG_URL").ok()),
            ado_username: cfg.ado_username.or_else(|| env::var("ADO_USERNAME").ok()),
            ado_pat: cfg.ado_pat.or_else(|| env::var("ADO_PAT").ok()),
        })
    }

    /// Returns the provider key or a configuration error naming both variables.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .context("CASEGEN_API_KEY or OPENAI_API_KEY not set in config or environment")
    }

    pub fn print_config(&self) {
        println!("index_path={}", self.index_path.display());
        println!("metadata_path={}", self.metadata_path.display());
        println!("dimensions={}", self.dimensions);
        println!("top_k={}", self.top_k);
        println!("api_key={}", redact(self.api_key.as_deref()));
        println!("api_base_url={}", self.api_base_url);
        println!("embedding_model={}", self.embedding_model);
        println!("generation_model={}", self.generation_model);
        println!("heading_scheme={}", self.heading_scheme);
        println!("strip_stop_words={}", self.strip_stop_words);
        println!("output_csv={}", self.output_csv.display());
        println!("ingest_workers={}", self.ingest_workers);
        println!("ingest_delay_ms={}", self.ingest_delay.as_millis());
        println!("ingest_batch_size={}", self.ingest_batch_size);
        println!("request_timeout_secs={}", self.request_timeout.as_secs());
        println!("debug={}", self.debug);
        println!("ado_org_url={}", self.ado_org_url.as_deref().unwrap_or(""));
        println!("ado_username={}", self.ado_username.as_deref().unwrap_or(""));
        println!("ado_pat={}", redact(self.ado_pat.as_deref()));
    }
}

fn legacy_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "t"))
        .unwrap_or(false)
}

fn redact(secret: Option<&str>) -> &'static str {
    match secret {
        Some(_) => "<set>",
        None => "<unset>",
    }
}

/// Installs the global fmt subscriber. `RUST_LOG` takes precedence over the debug flag.
pub fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
