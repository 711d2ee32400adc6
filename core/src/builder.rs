//! Blocked sort-based index construction.
//!
//! Each immediate subdirectory of the corpus root is one block, processed in
//! lexicographic order. Blocks are tokenized in parallel windows, but only
//! the coordinating thread assigns term and document ids, walking the window
//! in block order. That keeps every doc id of block `i` below every doc id
//! of block `i + 1`, which lets the merge concatenate postings lists.

use crate::encoding::{default_encoding, SharedEncoding};
use crate::error::{Error, Result};
use crate::id_map::IdMap;
use crate::index::CorpusStats;
use crate::inverter::invert_block;
use crate::merger::{merge, BlockOrdering, MergeStats};
use crate::persist::{save_doc_map, save_meta, save_stats, save_term_map, IndexPaths, MetaFile, FORMAT_VERSION, POSTINGS_STORE};
use crate::postings::{PostingsStore, PostingsWriter};
use crate::tokenizer::{StandardTokenizer, Tokenizer, TokenizerConfig};
use crate::{DocId, TermId};
use rayon::prelude::*;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const DOCUMENT_EXTENSION: &str = "txt";

#[derive(Clone)]
pub struct BuildConfig {
    /// Directory name of the finished index under the output directory.
    pub index_name: String,
    pub encoding: SharedEncoding,
    /// Blocks tokenized and inverted concurrently.
    pub workers: usize,
    /// Keep per-block stores under `blocks/` in the finished index.
    pub keep_blocks: bool,
    pub tokenizer: TokenizerConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            index_name: "BSBI".into(),
            encoding: default_encoding(),
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            keep_blocks: false,
            tokenizer: TokenizerConfig::default(),
        }
    }
}

impl fmt::Debug for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildConfig")
            .field("index_name", &self.index_name)
            .field("encoding", &self.encoding.name())
            .field("workers", &self.workers)
            .field("keep_blocks", &self.keep_blocks)
            .field("tokenizer", &self.tokenizer)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct IndexSummary {
    pub root: PathBuf,
    pub num_docs: u32,
    pub num_terms: u32,
    pub num_blocks: u32,
    pub merge: MergeStats,
}

struct ParsedDoc {
    key: String,
    terms: Vec<String>,
}

struct ParsedBlock {
    name: String,
    docs: Vec<ParsedDoc>,
}

/// Ids and statistics owned by the coordinator for the whole build.
#[derive(Default)]
struct Registry {
    terms: IdMap,
    docs: IdMap,
    stats: CorpusStats,
}

impl Registry {
    fn assign(&mut self, block: ParsedBlock) -> Result<(String, Vec<(TermId, DocId)>)> {
        let mut pairs = Vec::with_capacity(block.docs.iter().map(|d| d.terms.len()).sum());
        for doc in block.docs {
            let doc_id = self.docs.get_or_assign(&doc.key);
            self.stats.record(doc_id, doc.terms.len() as u32)?;
            for term in &doc.terms {
                pairs.push((self.terms.get_or_assign(term), doc_id));
            }
        }
        Ok((block.name, pairs))
    }
}

pub struct IndexBuilder {
    config: BuildConfig,
    tokenizer: Box<dyn Tokenizer>,
}

impl IndexBuilder {
    pub fn new(config: BuildConfig) -> Self {
        let tokenizer = Box::new(StandardTokenizer::new(config.tokenizer.clone()));
        Self { config, tokenizer }
    }

    /// Builds with a custom tokenizer; open the result with
    /// [`crate::index::Index::open_with_tokenizer`] and the same tokenizer.
    pub fn with_tokenizer(config: BuildConfig, tokenizer: Box<dyn Tokenizer>) -> Self {
        Self { config, tokenizer }
    }

    pub fn config(&self) -> &BuildConfig { &self.config }

    /// Indexes `corpus_root` into `output_dir/<index_name>`.
    ///
    /// Everything is written to a staging directory next to the target and
    /// renamed into place only on success; a failed build leaves no index.
    pub fn build(&self, corpus_root: &Path, output_dir: &Path) -> Result<IndexSummary> {
        self.validate(corpus_root, output_dir)?;
        let blocks = self.corpus_blocks(corpus_root, output_dir)?;
        if blocks.is_empty() {
            tracing::warn!(corpus = %corpus_root.display(), "corpus has no block directories");
        }

        let staging = output_dir.join(self.staging_name());
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let result = self.build_into(corpus_root, &blocks, &staging);
        let mut summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    tracing::warn!(path = %staging.display(), error = %cleanup, "failed to remove staging directory");
                }
                return Err(e);
            }
        };

        let target = output_dir.join(&self.config.index_name);
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(&staging, &target)?;
        summary.root = target;
        tracing::info!(
            root = %summary.root.display(),
            num_docs = summary.num_docs,
            num_terms = summary.num_terms,
            num_blocks = summary.num_blocks,
            "index build complete"
        );
        Ok(summary)
    }

    fn validate(&self, corpus_root: &Path, output_dir: &Path) -> Result<()> {
        if !corpus_root.is_dir() {
            return Err(Error::Configuration(format!("corpus root {} is not a directory", corpus_root.display())));
        }
        if !output_dir.is_dir() {
            return Err(Error::Configuration(format!("output directory {} does not exist", output_dir.display())));
        }
        let name = &self.config.index_name;
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(Error::Configuration(format!("invalid index name {name:?}")));
        }
        if self.config.workers == 0 {
            return Err(Error::Configuration("workers must be at least 1".into()));
        }
        Ok(())
    }

    fn staging_name(&self) -> String { format!(".{}.staging", self.config.index_name) }

    /// Block directories of the corpus. When the index is written into the
    /// corpus root itself, the published index and its staging directory
    /// are not blocks.
    fn corpus_blocks(&self, corpus_root: &Path, output_dir: &Path) -> Result<Vec<String>> {
        let mut blocks = list_blocks(corpus_root)?;
        if fs::canonicalize(corpus_root)? == fs::canonicalize(output_dir)? {
            let staging = self.staging_name();
            blocks.retain(|b| *b != self.config.index_name && *b != staging);
        }
        Ok(blocks)
    }

    fn build_into(&self, corpus_root: &Path, blocks: &[String], staging: &Path) -> Result<IndexSummary> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .map_err(|e| Error::Configuration(format!("worker pool: {e}")))?;
        let blocks_dir = staging.join("blocks");
        let mut registry = Registry::default();
        let mut store_names = Vec::with_capacity(blocks.len());

        for window in blocks.chunks(self.config.workers) {
            let parsed = pool.install(|| {
                window
                    .par_iter()
                    .map(|block| parse_block(corpus_root, block, &*self.tokenizer))
                    .collect::<Result<Vec<_>>>()
            })?;
            let assigned = parsed.into_iter().map(|block| registry.assign(block)).collect::<Result<Vec<_>>>()?;
            let written = pool.install(|| {
                assigned
                    .into_par_iter()
                    .map(|(block, pairs)| self.write_block(&blocks_dir, block, pairs))
                    .collect::<Result<Vec<_>>>()
            })?;
            store_names.extend(written);
        }

        let encoding = self.config.encoding.clone();
        let stores = store_names
            .iter()
            .map(|name| PostingsStore::open(&blocks_dir, name, encoding.clone()))
            .collect::<Result<Vec<_>>>()?;
        let inputs = stores.iter().map(PostingsStore::iter).collect::<Result<Vec<_>>>()?;
        let mut out = PostingsWriter::create(staging, POSTINGS_STORE, encoding)?;
        let merge_stats = merge(inputs, &mut out, BlockOrdering::Ascending)?;
        out.finish()?;
        drop(stores);
        if !self.config.keep_blocks && blocks_dir.exists() {
            fs::remove_dir_all(&blocks_dir)?;
        }

        let Registry { terms, docs, stats } = registry;
        let paths = IndexPaths::new(staging);
        save_term_map(&paths, &terms)?;
        save_doc_map(&paths, &docs)?;
        save_stats(&paths, &stats)?;
        let created_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "could not format build timestamp");
                String::new()
            });
        let meta = MetaFile {
            version: FORMAT_VERSION,
            created_at,
            num_docs: docs.len() as u32,
            num_terms: terms.len() as u32,
            num_blocks: blocks.len() as u32,
            encoding: self.config.encoding.name().to_owned(),
            tokenizer: self.config.tokenizer.clone(),
        };
        save_meta(&paths, &meta)?;

        Ok(IndexSummary {
            root: staging.to_path_buf(),
            num_docs: meta.num_docs,
            num_terms: meta.num_terms,
            num_blocks: meta.num_blocks,
            merge: merge_stats,
        })
    }

    fn write_block(&self, blocks_dir: &Path, block: String, pairs: Vec<(TermId, DocId)>) -> Result<String> {
        let store = format!("index_{block}");
        let num_pairs = pairs.len();
        let mut writer = PostingsWriter::create(blocks_dir, &store, self.config.encoding.clone())?;
        let terms = invert_block(pairs, &mut writer)?;
        writer.finish()?;
        tracing::info!(block = %block, pairs = num_pairs, terms, "block inverted");
        Ok(store)
    }
}

/// Immediate subdirectories of the corpus root, sorted by name.
pub fn list_blocks(corpus_root: &Path) -> Result<Vec<String>> {
    let mut blocks = Vec::new();
    for entry in fs::read_dir(corpus_root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            blocks.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    blocks.sort();
    Ok(blocks)
}

fn parse_block(corpus_root: &Path, block: &str, tokenizer: &dyn Tokenizer) -> Result<ParsedBlock> {
    let mut docs = Vec::new();
    for entry in WalkDir::new(corpus_root.join(block)).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|s| s.to_str()) != Some(DOCUMENT_EXTENSION) {
            continue;
        }
        let bytes = fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);
        docs.push(ParsedDoc { key: document_key(corpus_root, path), terms: tokenizer.normalize(&text) });
    }
    tracing::debug!(block, docs = docs.len(), "block parsed");
    Ok(ParsedBlock { name: block.to_owned(), docs })
}

/// Path relative to the corpus root, `/`-separated on every platform.
fn document_key(corpus_root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(corpus_root).unwrap_or(path);
    rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}
