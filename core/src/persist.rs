use crate::error::{Error, Result};
use crate::id_map::IdMap;
use crate::index::CorpusStats;
use crate::tokenizer::TokenizerConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;
/// Name of the merged postings store inside an index directory.
pub const POSTINGS_STORE: &str = "postings";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub created_at: String,
    pub num_docs: u32,
    pub num_terms: u32,
    pub num_blocks: u32,
    pub encoding: String,
    pub tokenizer: TokenizerConfig,
}

/// File layout of one named index directory.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn terms(&self) -> PathBuf { self.root.join("terms.dict") }
    pub fn docs(&self) -> PathBuf { self.root.join("docs.dict") }
    pub fn stats(&self) -> PathBuf { self.root.join("stats.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn blocks_dir(&self) -> PathBuf { self.root.join("blocks") }
}

fn save_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let mut f = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut f, value)?;
    f.flush()?;
    Ok(())
}

fn load_bincode<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = open_existing(path)?;
    Ok(bincode::deserialize_from(BufReader::new(f))?)
}

fn open_existing(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::Configuration(format!("missing index file {}", path.display())),
        _ => Error::Io(e),
    })
}

pub fn save_term_map(paths: &IndexPaths, map: &IdMap) -> Result<()> { save_bincode(&paths.terms(), map) }

pub fn load_term_map(paths: &IndexPaths) -> Result<IdMap> { load_bincode(&paths.terms()) }

pub fn save_doc_map(paths: &IndexPaths, map: &IdMap) -> Result<()> { save_bincode(&paths.docs(), map) }

pub fn load_doc_map(paths: &IndexPaths) -> Result<IdMap> { load_bincode(&paths.docs()) }

pub fn save_stats(paths: &IndexPaths, stats: &CorpusStats) -> Result<()> { save_bincode(&paths.stats(), stats) }

pub fn load_stats(paths: &IndexPaths) -> Result<CorpusStats> { load_bincode(&paths.stats()) }

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let f = open_existing(&paths.meta())?;
    let meta: MetaFile = serde_json::from_reader(BufReader::new(f))?;
    if meta.version != FORMAT_VERSION {
        return Err(Error::Configuration(format!("index format version {} is not supported", meta.version)));
    }
    Ok(meta)
}
