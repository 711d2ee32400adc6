//! Disk-backed inverted index built with Blocked Sort-Based Indexing.
//!
//! Blocks of the corpus are inverted independently into sorted postings
//! stores and k-way merged into one index, which is then served for
//! conjunctive boolean retrieval and BM25 ranking.

pub mod builder;
pub mod encoding;
pub mod error;
pub mod id_map;
pub mod index;
pub mod inverter;
pub mod merger;
pub mod persist;
pub mod postings;
pub mod ranking;
pub mod retrieval;
pub mod tokenizer;

use serde::{Deserialize, Serialize};

pub use error::{Error, Result};

pub type TermId = u32;
pub type DocId = u32;

/// One document in a term's postings list, with the term's occurrence count in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
}

impl Posting {
    pub fn new(doc_id: DocId, tf: u32) -> Self {
        Self { doc_id, tf }
    }
}

/// Doc ids of a postings list, in stored order.
pub fn doc_ids(postings: &[Posting]) -> Vec<DocId> {
    postings.iter().map(|p| p.doc_id).collect()
}
