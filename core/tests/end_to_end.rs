use bsbi::builder::{BuildConfig, IndexBuilder};
use bsbi::encoding::VarBytePostings;
use bsbi::index::Index;
use bsbi::ranking::{Bm25Ranker, CandidatePolicy};
use bsbi::retrieval::Retriever;
use bsbi::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn build(corpus: &Path, config: BuildConfig) -> (TempDir, PathBuf) {
    let out = tempdir().unwrap();
    let summary = IndexBuilder::new(config).build(corpus, out.path()).unwrap();
    (out, summary.root)
}

/// doc1 = "cat dog", doc2 = "dog bird", one per block.
fn two_doc_index() -> (TempDir, TempDir, Index) {
    let corpus = tempdir().unwrap();
    write(corpus.path(), "block1/doc1.txt", "cat dog");
    write(corpus.path(), "block2/doc2.txt", "dog bird");
    let (out, root) = build(corpus.path(), BuildConfig::default());
    let index = Index::open(root).unwrap();
    (corpus, out, index)
}

#[test]
fn scenario_a_single_term_returns_both_in_doc_order() {
    let (_c, _o, index) = two_doc_index();
    let names = Retriever::new(&index).retrieve_names("dog", None).unwrap();
    assert_eq!(names, vec!["block1/doc1.txt", "block2/doc2.txt"]);
}

#[test]
fn scenario_b_disjoint_terms_match_nothing() {
    let (_c, _o, index) = two_doc_index();
    assert!(Retriever::new(&index).retrieve_conjunctive("cat bird", None).unwrap().is_empty());
}

#[test]
fn scenario_c_equal_documents_score_equally() {
    let (_c, _o, index) = two_doc_index();
    let ranked = Bm25Ranker::new(&index).rank("dog", None, None).unwrap();
    assert_eq!(ranked.len(), 2);
    assert!((ranked[0].score - ranked[1].score).abs() < 1e-9);
    assert!(ranked[0].score > 0.0);
    // Ties fall back to ascending doc id.
    assert!(ranked[0].doc_id < ranked[1].doc_id);
}

#[test]
fn scenario_d_unknown_term_empties_the_result_without_error() {
    let (_c, _o, index) = two_doc_index();
    let retriever = Retriever::new(&index);
    assert!(retriever.retrieve_conjunctive("zebra dog", None).unwrap().is_empty());
    assert!(retriever.retrieve_conjunctive("zebra", None).unwrap().is_empty());
    assert!(Bm25Ranker::new(&index).rank("zebra dog", None, None).unwrap().is_empty());
}

#[test]
fn empty_query_matches_nothing() {
    let (_c, _o, index) = two_doc_index();
    assert!(Retriever::new(&index).retrieve_conjunctive("", None).unwrap().is_empty());
    assert!(Retriever::new(&index).retrieve_conjunctive("? ! 42", None).unwrap().is_empty());
}

#[test]
fn query_uses_index_normalization() {
    let (_c, _o, index) = two_doc_index();
    let docs = Retriever::new(&index).retrieve_conjunctive("DOG, Cat!", None).unwrap();
    assert_eq!(docs, vec![0]);
}

#[test]
fn bm25_prefers_higher_tf_and_shorter_docs() {
    let corpus = tempdir().unwrap();
    write(corpus.path(), "a/many.txt", "rust rust rust code");
    write(corpus.path(), "a/once.txt", "rust code");
    write(corpus.path(), "b/long.txt", "rust code and many other unrelated words here");
    let (_out, root) = build(corpus.path(), BuildConfig::default());
    let index = Index::open(root).unwrap();
    let ranked = Bm25Ranker::new(&index).rank_names("rust code", None, None).unwrap();
    let names: Vec<&str> = ranked.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a/many.txt", "a/once.txt", "b/long.txt"]);
    assert!(ranked.iter().all(|(_, s)| *s >= 0.0));

    let top = Bm25Ranker::new(&index).rank("rust", Some(1), None).unwrap();
    assert_eq!(top.len(), 1);
}

#[test]
fn disjunctive_policy_scores_partial_matches() {
    let (_c, _o, index) = two_doc_index();
    let ranker = Bm25Ranker::new(&index).with_policy(CandidatePolicy::Disjunctive);
    let ranked = ranker.rank("cat bird", None, None).unwrap();
    assert_eq!(ranked.len(), 2);
    assert!((ranked[0].score - ranked[1].score).abs() < 1e-9);
    assert!(Retriever::new(&index).retrieve_disjunctive("cat zebra", None).unwrap() == vec![0]);
}

#[test]
fn merged_index_spans_many_blocks() {
    let corpus = tempdir().unwrap();
    for b in 0..6 {
        for d in 0..3 {
            let text = if d == 0 { "shared alpha".to_string() } else { format!("shared beta{}", "x".repeat(b)) };
            write(corpus.path(), &format!("blk{b}/d{d}.txt"), &text);
        }
    }
    let (_out, root) = build(corpus.path(), BuildConfig { workers: 3, ..BuildConfig::default() });
    let index = Index::open(root).unwrap();
    assert_eq!(index.num_docs(), 18);
    let shared = Retriever::new(&index).retrieve_conjunctive("shared", None).unwrap();
    assert_eq!(shared, (0..18).collect::<Vec<u32>>());
    let alpha = Retriever::new(&index).retrieve_conjunctive("alpha shared", None).unwrap();
    assert_eq!(alpha, vec![0, 3, 6, 9, 12, 15]);
}

#[test]
fn vbyte_index_answers_like_the_default() {
    let corpus = tempdir().unwrap();
    write(corpus.path(), "block1/doc1.txt", "cat dog");
    write(corpus.path(), "block2/doc2.txt", "dog bird");
    let config = BuildConfig { encoding: Arc::new(VarBytePostings), ..BuildConfig::default() };
    let (_out, root) = build(corpus.path(), config);
    let index = Index::open(root).unwrap();
    assert_eq!(index.meta().encoding, "vbyte");
    assert_eq!(Retriever::new(&index).retrieve_conjunctive("dog", None).unwrap(), vec![0, 1]);
}

#[test]
fn rebuild_replaces_previous_index() {
    let corpus = tempdir().unwrap();
    write(corpus.path(), "b/one.txt", "first");
    let out = tempdir().unwrap();
    let builder = IndexBuilder::new(BuildConfig::default());
    builder.build(corpus.path(), out.path()).unwrap();
    write(corpus.path(), "b/two.txt", "second");
    let summary = builder.build(corpus.path(), out.path()).unwrap();
    assert_eq!(Index::open(&summary.root).unwrap().num_docs(), 2);
}

#[test]
fn empty_corpus_builds_an_empty_index() {
    let corpus = tempdir().unwrap();
    let (_out, root) = build(corpus.path(), BuildConfig::default());
    let index = Index::open(root).unwrap();
    assert_eq!(index.num_docs(), 0);
    assert!(Bm25Ranker::new(&index).rank("anything", None, None).unwrap().is_empty());
}

#[test]
fn expired_deadline_aborts_query() {
    let (_c, _o, index) = two_doc_index();
    let deadline = Instant::now() - Duration::from_millis(1);
    let err = Retriever::new(&index).retrieve_conjunctive("dog", Some(deadline)).unwrap_err();
    assert!(matches!(err, Error::Timeout));
    let err = Bm25Ranker::new(&index).rank("dog", None, Some(deadline)).unwrap_err();
    assert!(matches!(err, Error::Timeout));
    // The retriever keeps working afterwards.
    assert_eq!(Retriever::new(&index).retrieve_conjunctive("dog", None).unwrap(), vec![0, 1]);
}

#[test]
fn unknown_term_short_circuits_before_any_fetch() {
    let (_c, _o, index) = two_doc_index();
    let deadline = Instant::now() - Duration::from_millis(1);
    // An unknown term settles a conjunctive query without reading postings,
    // so even an expired deadline is never consulted.
    assert!(Retriever::new(&index).retrieve_conjunctive("zebra dog", Some(deadline)).unwrap().is_empty());
    assert!(Bm25Ranker::new(&index).rank("dog zebra", None, Some(deadline)).unwrap().is_empty());
    let any = Bm25Ranker::new(&index).with_policy(CandidatePolicy::Disjunctive);
    assert!(matches!(any.rank("dog zebra", None, Some(deadline)), Err(Error::Timeout)));
}

#[test]
fn concurrent_queries_share_one_index() {
    let (_c, _o, index) = two_doc_index();
    let index = Arc::new(index);
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let index = Arc::clone(&index);
            std::thread::spawn(move || {
                let q = if i % 2 == 0 { "dog" } else { "cat dog" };
                Retriever::new(&index).retrieve_conjunctive(q, None).unwrap()
            })
        })
        .collect();
    for (i, h) in handles.into_iter().enumerate() {
        let expected = if i % 2 == 0 { vec![0, 1] } else { vec![0] };
        assert_eq!(h.join().unwrap(), expected);
    }
}

#[test]
fn corrupt_postings_fail_to_open() {
    let corpus = tempdir().unwrap();
    write(corpus.path(), "b/d.txt", "cat dog");
    let (_out, root) = build(corpus.path(), BuildConfig::default());
    let data = root.join("postings.index");
    let bytes = fs::read(&data).unwrap();
    fs::write(&data, &bytes[..bytes.len() / 2]).unwrap();
    assert!(matches!(Index::open(&root), Err(Error::Encoding { .. })));
}
