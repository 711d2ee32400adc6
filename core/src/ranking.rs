//! BM25 Okapi ranking over a candidate set.
//!
//! ```text
//! score(d) = sum_t idf(t) * tf(t,d) * (k1 + 1) / (tf(t,d) + k1 * (1 - b + b * len(d) / avgLen))
//! idf(t)   = ln((N - df(t) + 0.5) / (df(t) + 0.5) + 1)
//! ```

use crate::error::Result;
use crate::index::Index;
use crate::retrieval::{disjoin, Retriever};
use crate::{DocId, Posting};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation rate.
    pub k1: f64,
    /// Length-normalization strength, 0 (none) to 1 (full).
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self { Self { k1: 2.0, b: 0.75 } }
}

/// Which documents get scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidatePolicy {
    /// Only documents containing every query term.
    #[default]
    Conjunctive,
    /// Any document containing at least one query term.
    Disjunctive,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f64,
}

/// Inverse document frequency; defined for `df == 0` and positive whenever `df <= n`.
pub fn idf(num_docs: u32, df: u32) -> f64 {
    let (n, df) = (num_docs as f64, df as f64);
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// One term's contribution to a document's score.
pub fn term_score(idf: f64, tf: u32, doc_len: u32, avg_len: f64, params: &Bm25Params) -> f64 {
    if tf == 0 {
        return 0.0;
    }
    let tf = tf as f64;
    let len_ratio = if avg_len > 0.0 { doc_len as f64 / avg_len } else { 1.0 };
    idf * (tf * (params.k1 + 1.0)) / (tf + params.k1 * (1.0 - params.b + params.b * len_ratio))
}

pub struct Bm25Ranker<'a> {
    index: &'a Index,
    params: Bm25Params,
    policy: CandidatePolicy,
}

impl<'a> Bm25Ranker<'a> {
    pub fn new(index: &'a Index) -> Self {
        Self { index, params: Bm25Params::default(), policy: CandidatePolicy::default() }
    }

    pub fn with_params(mut self, params: Bm25Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_policy(mut self, policy: CandidatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Scores the candidate documents for `query`, highest first; equal
    /// scores are ordered by ascending doc id. `top_k` truncates the result.
    pub fn rank(&self, query: &str, top_k: Option<usize>, deadline: Option<Instant>) -> Result<Vec<ScoredDoc>> {
        let retriever = Retriever::new(self.index);
        let terms = retriever.resolve(query);
        let (lists, candidates) = match self.policy {
            CandidatePolicy::Conjunctive => retriever.fetch_conjunctive(&terms, deadline)?,
            CandidatePolicy::Disjunctive => {
                let lists = retriever.fetch(&terms, deadline)?;
                let candidates = disjoin(&lists);
                (lists, candidates)
            }
        };
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let stats = self.index.stats();
        let n = stats.num_docs();
        let avg_len = stats.average_doc_length();
        let mut scores = vec![0.0f64; candidates.len()];
        for postings in lists.iter().filter(|l| !l.is_empty()) {
            let term_idf = idf(n, postings.len() as u32);
            for (i, tf) in frequencies(&candidates, postings).into_iter().enumerate() {
                scores[i] += term_score(term_idf, tf, stats.doc_length(candidates[i]), avg_len, &self.params);
            }
        }

        let mut ranked: Vec<ScoredDoc> =
            candidates.into_iter().zip(scores).map(|(doc_id, score)| ScoredDoc { doc_id, score }).collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
        if let Some(k) = top_k {
            ranked.truncate(k);
        }
        tracing::debug!(query, hits = ranked.len(), "bm25 ranking done");
        Ok(ranked)
    }

    /// [`Self::rank`] with document names.
    pub fn rank_names(&self, query: &str, top_k: Option<usize>, deadline: Option<Instant>) -> Result<Vec<(String, f64)>> {
        self.rank(query, top_k, deadline)?
            .into_iter()
            .map(|hit| Ok((self.index.doc_name(hit.doc_id)?.to_owned(), hit.score)))
            .collect()
    }
}

/// For each candidate (ascending), its frequency in `postings` (ascending), or 0.
fn frequencies(candidates: &[DocId], postings: &[Posting]) -> Vec<u32> {
    let mut out = Vec::with_capacity(candidates.len());
    let mut j = 0;
    for &doc in candidates {
        while j < postings.len() && postings[j].doc_id < doc {
            j += 1;
        }
        out.push(match postings.get(j) {
            Some(p) if p.doc_id == doc => p.tf,
            _ => 0,
        });
    }
    out
}
