use crate::error::{Error, Result};
use crate::index::Index;
use crate::{DocId, Posting, TermId};
use std::time::Instant;

/// Intersection of two ascending doc id lists by a linear two-pointer walk.
pub fn sorted_intersect(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Union of two ascending doc id lists, ascending and duplicate-free.
pub fn sorted_union(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Documents present in at least one list.
pub(crate) fn disjoin(lists: &[Vec<Posting>]) -> Vec<DocId> {
    lists.iter().fold(Vec::new(), |acc, l| sorted_union(&acc, &crate::doc_ids(l)))
}

pub(crate) fn check_deadline(deadline: Option<Instant>) -> Result<()> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(Error::Timeout),
        _ => Ok(()),
    }
}

/// A query term resolved against the index. `term_id` is `None` for terms the
/// corpus never contained.
#[derive(Debug, Clone)]
pub struct QueryTerm {
    pub term: String,
    pub term_id: Option<TermId>,
}

/// Conjunctive (AND) retrieval over a finished index. Holds no state between
/// calls, so one retriever can serve concurrent queries.
pub struct Retriever<'a> {
    index: &'a Index,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a Index) -> Self { Self { index } }

    /// Normalizes the query and resolves each distinct term.
    pub fn resolve(&self, query: &str) -> Vec<QueryTerm> {
        let mut terms = self.index.normalize(query);
        let mut seen = std::collections::HashSet::new();
        terms.retain(|t| seen.insert(t.clone()));
        terms
            .into_iter()
            .map(|term| {
                let term_id = self.index.term_id(&term);
                QueryTerm { term, term_id }
            })
            .collect()
    }

    /// Postings of each resolved term, fetched one at a time with the
    /// deadline checked before every fetch. Unknown terms yield empty lists.
    pub(crate) fn fetch(&self, terms: &[QueryTerm], deadline: Option<Instant>) -> Result<Vec<Vec<Posting>>> {
        let mut lists = Vec::with_capacity(terms.len());
        for qt in terms {
            check_deadline(deadline)?;
            let postings = match qt.term_id {
                Some(id) => self.index.postings_for(id)?,
                None => Vec::new(),
            };
            lists.push(postings);
        }
        Ok(lists)
    }

    /// Postings of every term together with the documents containing all of
    /// them. Terms are fetched cheapest first, by document frequency from the
    /// directory; an unknown term or an empty running intersection stops
    /// before any further fetch and yields nothing.
    pub(crate) fn fetch_conjunctive(
        &self,
        terms: &[QueryTerm],
        deadline: Option<Instant>,
    ) -> Result<(Vec<Vec<Posting>>, Vec<DocId>)> {
        let mut ids = Vec::with_capacity(terms.len());
        for qt in terms {
            match qt.term_id {
                Some(id) => ids.push(id),
                None => return Ok((Vec::new(), Vec::new())),
            }
        }
        if ids.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        ids.sort_by_key(|&id| self.index.document_frequency(id));

        let mut lists = Vec::with_capacity(ids.len());
        let mut acc: Option<Vec<DocId>> = None;
        for id in ids {
            check_deadline(deadline)?;
            let postings = self.index.postings_for(id)?;
            let docs = crate::doc_ids(&postings);
            let next = match acc {
                None => docs,
                Some(prev) => sorted_intersect(&prev, &docs),
            };
            if next.is_empty() {
                return Ok((Vec::new(), Vec::new()));
            }
            lists.push(postings);
            acc = Some(next);
        }
        Ok((lists, acc.unwrap_or_default()))
    }

    /// Ascending ids of the documents containing every query term. Unknown
    /// terms make the result empty; an empty query matches nothing.
    pub fn retrieve_conjunctive(&self, query: &str, deadline: Option<Instant>) -> Result<Vec<DocId>> {
        let terms = self.resolve(query);
        let (_, docs) = self.fetch_conjunctive(&terms, deadline)?;
        tracing::debug!(query, terms = terms.len(), hits = docs.len(), "conjunctive query evaluated");
        Ok(docs)
    }

    /// Ascending ids of the documents containing at least one query term.
    pub fn retrieve_disjunctive(&self, query: &str, deadline: Option<Instant>) -> Result<Vec<DocId>> {
        let terms = self.resolve(query);
        let lists = self.fetch(&terms, deadline)?;
        Ok(disjoin(&lists))
    }

    /// [`Self::retrieve_conjunctive`] mapped to document names.
    pub fn retrieve_names(&self, query: &str, deadline: Option<Instant>) -> Result<Vec<String>> {
        self.retrieve_conjunctive(query, deadline)?
            .into_iter()
            .map(|id| self.index.doc_name(id).map(str::to_owned))
            .collect()
    }
}
