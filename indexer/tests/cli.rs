use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn indexer() -> Command {
    Command::new(env!("CARGO_BIN_EXE_indexer"))
}

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

#[test]
fn build_then_query() {
    let corpus = tempdir().unwrap();
    write(corpus.path(), "block1/doc1.txt", "cat dog");
    write(corpus.path(), "block2/doc2.txt", "dog bird");
    let out = tempdir().unwrap();

    let status = indexer()
        .args(["build", "--corpus"])
        .arg(corpus.path())
        .arg("--output")
        .arg(out.path())
        .args(["--name", "pets", "--encoding", "vbyte"])
        .status()
        .unwrap();
    assert!(status.success());

    let index = out.path().join("pets");
    let output = indexer().args(["query", "--mode", "boolean", "--index"]).arg(&index).arg("dog").output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "block1/doc1.txt\nblock2/doc2.txt\n");

    let output = indexer().args(["query", "--index"]).arg(&index).arg("zebra dog").output().unwrap();
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn missing_corpus_is_fatal_and_writes_nothing() {
    let out = tempdir().unwrap();
    let status = indexer()
        .args(["build", "--corpus"])
        .arg(out.path().join("missing"))
        .arg("--output")
        .arg(out.path())
        .status()
        .unwrap();
    assert!(!status.success());
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}
