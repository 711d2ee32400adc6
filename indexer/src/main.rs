use anyhow::{anyhow, Context, Result};
use bsbi::builder::{BuildConfig, IndexBuilder};
use bsbi::encoding;
use bsbi::index::Index;
use bsbi::ranking::{Bm25Params, Bm25Ranker, CandidatePolicy};
use bsbi::retrieval::Retriever;
use bsbi::tokenizer::TokenizerConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query a blocked sort-based inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum EncodingArg {
    Uncompressed,
    Vbyte,
}

impl EncodingArg {
    fn name(self) -> &'static str {
        match self {
            EncodingArg::Uncompressed => "uncompressed",
            EncodingArg::Vbyte => "vbyte",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Ascending document list containing every term
    Boolean,
    /// BM25 over documents containing every term
    Bm25,
    /// BM25 over documents containing any term
    Bm25Any,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index from a corpus root whose subdirectories are blocks of .txt documents
    Build {
        /// Corpus root directory
        #[arg(long)]
        corpus: PathBuf,
        /// Existing output directory; the index is written to <output>/<name>
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value = "BSBI")]
        name: String,
        #[arg(long, value_enum, default_value_t = EncodingArg::Uncompressed)]
        encoding: EncodingArg,
        /// Blocks processed concurrently (defaults to available cores)
        #[arg(long)]
        workers: Option<usize>,
        /// Keep per-block postings stores under <index>/blocks
        #[arg(long, default_value_t = false)]
        keep_blocks: bool,
        /// Drop English stopwords
        #[arg(long, default_value_t = false)]
        stopwords: bool,
        /// Apply Snowball English stemming
        #[arg(long, default_value_t = false)]
        stem: bool,
        #[arg(long, default_value_t = 2)]
        min_term_len: usize,
    },
    /// Answer queries against a built index; reads one query per stdin line when none is given
    Query {
        /// Index directory (<output>/<name> from build)
        #[arg(long)]
        index: PathBuf,
        #[arg(long, value_enum, default_value_t = Mode::Bm25)]
        mode: Mode,
        /// Maximum ranked hits to print
        #[arg(long, default_value_t = 10)]
        k: usize,
        #[arg(long, default_value_t = 2.0)]
        k1: f64,
        #[arg(long, default_value_t = 0.75)]
        b: f64,
        /// Per-query time limit in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        query: Option<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(io::stderr).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { corpus, output, name, encoding, workers, keep_blocks, stopwords, stem, min_term_len } => {
            let encoding = encoding::by_name(encoding.name()).ok_or_else(|| anyhow!("unknown encoding"))?;
            let defaults = BuildConfig::default();
            let config = BuildConfig {
                index_name: name,
                encoding,
                workers: workers.unwrap_or(defaults.workers),
                keep_blocks,
                tokenizer: TokenizerConfig { remove_stopwords: stopwords, stem, min_term_len, ..TokenizerConfig::default() },
            };
            build_index(&corpus, &output, config)
        }
        Commands::Query { index, mode, k, k1, b, timeout_ms, query } => {
            let session = QuerySession {
                index: Index::open(&index).with_context(|| format!("opening index {}", index.display()))?,
                mode,
                k,
                params: Bm25Params { k1, b },
                timeout: timeout_ms.map(Duration::from_millis),
            };
            match query {
                Some(q) => session.answer(&q, &mut io::stdout().lock()),
                None => session.repl(),
            }
        }
    }
}

fn build_index(corpus: &Path, output: &Path, config: BuildConfig) -> Result<()> {
    tracing::info!(?config, corpus = %corpus.display(), output = %output.display(), "building index");
    let summary = IndexBuilder::new(config).build(corpus, output).context("index build failed")?;
    println!(
        "{}: {} documents, {} terms, {} blocks",
        summary.root.display(),
        summary.num_docs,
        summary.num_terms,
        summary.num_blocks
    );
    Ok(())
}

struct QuerySession {
    index: Index,
    mode: Mode,
    k: usize,
    params: Bm25Params,
    timeout: Option<Duration>,
}

impl QuerySession {
    fn answer<W: Write>(&self, query: &str, out: &mut W) -> Result<()> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        match self.mode {
            Mode::Boolean => {
                for name in Retriever::new(&self.index).retrieve_names(query, deadline)? {
                    writeln!(out, "{name}")?;
                }
            }
            Mode::Bm25 | Mode::Bm25Any => {
                let policy = if self.mode == Mode::Bm25Any { CandidatePolicy::Disjunctive } else { CandidatePolicy::Conjunctive };
                let ranker = Bm25Ranker::new(&self.index).with_params(self.params).with_policy(policy);
                for (name, score) in ranker.rank_names(query, Some(self.k), deadline)? {
                    writeln!(out, "{score:.4}\t{name}")?;
                }
            }
        }
        Ok(())
    }

    /// One query per line until EOF; a failing query is reported and the session continues.
    fn repl(&self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout().lock();
        write!(stdout, "search >> ")?;
        stdout.flush()?;
        for line in stdin.lock().lines() {
            let line = line?;
            if !line.trim().is_empty() {
                if let Err(e) = self.answer(&line, &mut stdout) {
                    tracing::error!(query = %line, error = %e, "query failed");
                }
            }
            write!(stdout, "search >> ")?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
        Ok(())
    }
}
