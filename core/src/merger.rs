//! K-way merge of per-block postings stores.
//!
//! One cursor per input is held open and only the postings list each cursor
//! is positioned on is resident, so memory does not grow with the corpus.

use crate::error::{Error, Result};
use crate::postings::{PostingsIter, PostingsWriter};
use crate::{Posting, TermId};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// How doc ids of the inputs relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockOrdering {
    /// Inputs are in block-creation order: every doc id in input `i` is
    /// smaller than every doc id first assigned in input `i + 1`. Lists are
    /// concatenated, and a violation fails the merge.
    #[default]
    Ascending,
    /// No ordering between inputs; lists are merged by doc id and the
    /// frequencies of a doc id seen in several inputs are summed.
    Unordered,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub terms: usize,
    pub postings: usize,
}

struct Cursor {
    iter: PostingsIter,
    head: Option<(TermId, Vec<Posting>)>,
}

impl Cursor {
    fn new(mut iter: PostingsIter) -> Result<Self> {
        let head = iter.next().transpose()?;
        Ok(Self { iter, head })
    }

    fn advance(&mut self) -> Result<Option<(TermId, Vec<Posting>)>> {
        let next = self.iter.next().transpose()?;
        Ok(std::mem::replace(&mut self.head, next))
    }
}

/// Merges `inputs` into `out`, one entry per distinct term in ascending term
/// order. Inputs are consumed and closed when this returns.
pub fn merge(inputs: Vec<PostingsIter>, out: &mut PostingsWriter, ordering: BlockOrdering) -> Result<MergeStats> {
    let mut cursors = inputs.into_iter().map(Cursor::new).collect::<Result<Vec<_>>>()?;
    // Min-heap on (term, input index): equal terms pop in input order.
    let mut heap: BinaryHeap<Reverse<(TermId, usize)>> = cursors
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.head.as_ref().map(|(t, _)| Reverse((*t, i))))
        .collect();

    let mut stats = MergeStats::default();
    let mut parts: Vec<(usize, Vec<Posting>)> = Vec::with_capacity(cursors.len());
    while let Some(Reverse((term_id, first))) = heap.pop() {
        parts.clear();
        let mut take = |i: usize, heap: &mut BinaryHeap<Reverse<(TermId, usize)>>| -> Result<()> {
            if let Some((_, postings)) = cursors[i].advance()? {
                parts.push((i, postings));
            }
            if let Some((next_term, _)) = &cursors[i].head {
                heap.push(Reverse((*next_term, i)));
            }
            Ok(())
        };
        take(first, &mut heap)?;
        while let Some(&Reverse((t, i))) = heap.peek() {
            if t != term_id {
                break;
            }
            heap.pop();
            take(i, &mut heap)?;
        }

        let merged = match ordering {
            BlockOrdering::Ascending => concatenate(term_id, &mut parts)?,
            BlockOrdering::Unordered => merge_by_doc(&mut parts),
        };
        stats.terms += 1;
        stats.postings += merged.len();
        out.append(term_id, &merged)?;
    }
    tracing::debug!(terms = stats.terms, postings = stats.postings, "merged block stores");
    Ok(stats)
}

fn concatenate(term_id: TermId, parts: &mut [(usize, Vec<Posting>)]) -> Result<Vec<Posting>> {
    let mut merged: Vec<Posting> = Vec::with_capacity(parts.iter().map(|(_, p)| p.len()).sum());
    for (input, postings) in parts.iter_mut() {
        if let (Some(last), Some(first)) = (merged.last(), postings.first()) {
            if first.doc_id <= last.doc_id {
                return Err(Error::InvariantViolation(format!(
                    "input {input} starts term {term_id} at doc {} but an earlier input already reached doc {}",
                    first.doc_id, last.doc_id
                )));
            }
        }
        merged.append(postings);
    }
    Ok(merged)
}

fn merge_by_doc(parts: &mut [(usize, Vec<Posting>)]) -> Vec<Posting> {
    let mut all: Vec<Posting> = parts.iter_mut().flat_map(|(_, p)| p.drain(..)).collect();
    all.sort_by_key(|p| p.doc_id);
    let mut merged: Vec<Posting> = Vec::with_capacity(all.len());
    for p in all {
        match merged.last_mut() {
            Some(last) if last.doc_id == p.doc_id => last.tf += p.tf,
            _ => merged.push(p),
        }
    }
    merged
}
