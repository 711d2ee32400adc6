use crate::encoding;
use crate::error::{Error, Result};
use crate::id_map::IdMap;
use crate::persist::{load_doc_map, load_meta, load_stats, load_term_map, IndexPaths, MetaFile, POSTINGS_STORE};
use crate::postings::PostingsStore;
use crate::tokenizer::{StandardTokenizer, Tokenizer};
use crate::{DocId, Posting, TermId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-document token counts, indexed by doc id.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub doc_lengths: Vec<u32>,
    pub total_tokens: u64,
}

impl CorpusStats {
    /// Records the length of the next document. Doc ids are dense, so
    /// `doc_id` must equal the number of documents recorded so far.
    pub fn record(&mut self, doc_id: DocId, length: u32) -> Result<()> {
        if doc_id as usize != self.doc_lengths.len() {
            return Err(Error::InvariantViolation(format!(
                "length recorded for doc {doc_id} but {} documents are known",
                self.doc_lengths.len()
            )));
        }
        self.doc_lengths.push(length);
        self.total_tokens += length as u64;
        Ok(())
    }

    pub fn num_docs(&self) -> u32 { self.doc_lengths.len() as u32 }

    pub fn doc_length(&self, doc_id: DocId) -> u32 {
        self.doc_lengths.get(doc_id as usize).copied().unwrap_or(0)
    }

    pub fn average_doc_length(&self) -> f64 {
        if self.doc_lengths.is_empty() {
            return 0.0;
        }
        self.total_tokens as f64 / self.doc_lengths.len() as f64
    }
}

/// A finished index opened read-only. Shareable across threads; every
/// postings fetch uses its own file handle.
pub struct Index {
    paths: IndexPaths,
    meta: MetaFile,
    terms: IdMap,
    docs: IdMap,
    stats: CorpusStats,
    postings: PostingsStore,
    tokenizer: Box<dyn Tokenizer>,
}

impl Index {
    /// Opens the index with the tokenizer settings it was built with.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let paths = IndexPaths::new(dir);
        let meta = load_meta(&paths)?;
        let tokenizer = Box::new(StandardTokenizer::new(meta.tokenizer.clone()));
        Self::load(paths, meta, tokenizer)
    }

    /// Opens the index with a caller-supplied tokenizer, which must match the
    /// one used at build time.
    pub fn open_with_tokenizer<P: AsRef<Path>>(dir: P, tokenizer: Box<dyn Tokenizer>) -> Result<Self> {
        let paths = IndexPaths::new(dir);
        let meta = load_meta(&paths)?;
        Self::load(paths, meta, tokenizer)
    }

    fn load(paths: IndexPaths, meta: MetaFile, tokenizer: Box<dyn Tokenizer>) -> Result<Self> {
        let encoding = encoding::by_name(&meta.encoding)
            .ok_or_else(|| Error::Configuration(format!("unknown postings encoding {:?}", meta.encoding)))?;
        let terms = load_term_map(&paths)?;
        let docs = load_doc_map(&paths)?;
        let stats = load_stats(&paths)?;
        if stats.doc_lengths.len() != docs.len() {
            return Err(Error::encoding(
                paths.stats(),
                format!("{} document lengths for {} documents", stats.doc_lengths.len(), docs.len()),
            ));
        }
        let postings = PostingsStore::open(&paths.root, POSTINGS_STORE, encoding)?;
        tracing::info!(root = %paths.root.display(), num_docs = docs.len(), num_terms = terms.len(), "index opened");
        Ok(Self { paths, meta, terms, docs, stats, postings, tokenizer })
    }

    pub fn paths(&self) -> &IndexPaths { &self.paths }
    pub fn meta(&self) -> &MetaFile { &self.meta }
    pub fn terms(&self) -> &IdMap { &self.terms }
    pub fn docs(&self) -> &IdMap { &self.docs }
    pub fn stats(&self) -> &CorpusStats { &self.stats }
    pub fn postings(&self) -> &PostingsStore { &self.postings }
    pub fn num_docs(&self) -> u32 { self.stats.num_docs() }

    /// Query text through the same normalization the corpus went through.
    pub fn normalize(&self, text: &str) -> Vec<String> { self.tokenizer.normalize(text) }

    pub fn term_id(&self, term: &str) -> Option<TermId> { self.terms.key_to_id(term).ok() }

    pub fn document_frequency(&self, term_id: TermId) -> u32 { self.postings.document_frequency(term_id) }

    /// Postings of a term id; a term with no postings yields an empty list.
    pub fn postings_for(&self, term_id: TermId) -> Result<Vec<Posting>> {
        match self.postings.lookup(term_id) {
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            other => other,
        }
    }

    pub fn doc_name(&self, doc_id: DocId) -> Result<&str> { self.docs.id_to_key(doc_id) }
}
