use crate::error::Result;
use crate::postings::PostingsWriter;
use crate::{DocId, Posting, TermId};

/// Sorts one block's (term, doc) occurrence pairs and writes a postings list
/// per term. Repeated pairs collapse into one posting whose `tf` counts them.
///
/// Returns the number of terms written; an empty block writes nothing.
pub fn invert_block(mut pairs: Vec<(TermId, DocId)>, writer: &mut PostingsWriter) -> Result<usize> {
    pairs.sort_unstable();
    let mut written = 0;
    let mut current: Option<TermId> = None;
    let mut postings: Vec<Posting> = Vec::new();

    for (term_id, doc_id) in pairs {
        if current != Some(term_id) {
            if let Some(prev) = current {
                writer.append(prev, &postings)?;
                written += 1;
                postings.clear();
            }
            current = Some(term_id);
        }
        match postings.last_mut() {
            Some(last) if last.doc_id == doc_id => last.tf += 1,
            _ => postings.push(Posting::new(doc_id, 1)),
        }
    }
    if let Some(last_term) = current {
        writer.append(last_term, &postings)?;
        written += 1;
    }
    Ok(written)
}
