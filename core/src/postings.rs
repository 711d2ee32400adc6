//! On-disk postings store.
//!
//! A store named `n` in directory `d` is two files:
//! - `d/n.index`: encoded postings lists back to back, in ascending term id order
//! - `d/n.dict`: bincode [`Directory`] mapping each term id to its byte range
//!
//! The directory is written last, when the writer is finished or dropped, so
//! a store without a `.dict` file was never completed.

use crate::encoding::SharedEncoding;
use crate::error::{Error, Result};
use crate::{Posting, TermId};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DIRECTORY_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub term_id: TermId,
    pub offset: u64,
    pub len: u32,
    /// Number of postings, i.e. the term's document frequency within this store.
    pub doc_count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Directory {
    version: u32,
    encoding: String,
    entries: Vec<DirectoryEntry>,
}

pub fn data_path(dir: &Path, name: &str) -> PathBuf { dir.join(format!("{name}.index")) }

pub fn directory_path(dir: &Path, name: &str) -> PathBuf { dir.join(format!("{name}.dict")) }

/// Deletes both files of a store; missing files are not an error.
pub fn remove_store(dir: &Path, name: &str) -> Result<()> {
    for path in [data_path(dir, name), directory_path(dir, name)] {
        match fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
    }
    Ok(())
}

/// Append-only writer. Entries must arrive in strictly increasing term id order.
pub struct PostingsWriter {
    data_path: PathBuf,
    dict_path: PathBuf,
    data: BufWriter<File>,
    encoding: SharedEncoding,
    entries: Vec<DirectoryEntry>,
    offset: u64,
    closed: bool,
}

impl PostingsWriter {
    pub fn create(dir: &Path, name: &str, encoding: SharedEncoding) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let data_path = data_path(dir, name);
        let dict_path = directory_path(dir, name);
        // A stale directory must not describe the new data file.
        if dict_path.exists() {
            fs::remove_file(&dict_path)?;
        }
        let data = BufWriter::new(File::create(&data_path)?);
        Ok(Self { data_path, dict_path, data, encoding, entries: Vec::new(), offset: 0, closed: false })
    }

    pub fn append(&mut self, term_id: TermId, postings: &[Posting]) -> Result<()> {
        if self.closed {
            return Err(Error::InvariantViolation(format!("append to closed store {}", self.data_path.display())));
        }
        if let Some(last) = self.entries.last() {
            if term_id <= last.term_id {
                return Err(Error::InvariantViolation(format!(
                    "term id {term_id} appended after {} in {}",
                    last.term_id,
                    self.data_path.display()
                )));
            }
        }
        check_postings(term_id, postings)?;

        let bytes = self.encoding.encode(postings);
        let len = u32::try_from(bytes.len())
            .map_err(|_| Error::InvariantViolation(format!("postings for term {term_id} exceed 4 GiB")))?;
        self.data.write_all(&bytes)?;
        self.entries.push(DirectoryEntry { term_id, offset: self.offset, len, doc_count: postings.len() as u32 });
        self.offset += len as u64;
        Ok(())
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Flushes the data file and writes the directory.
    pub fn finish(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.data.flush()?;
        self.data.get_ref().sync_all()?;
        let directory = Directory {
            version: DIRECTORY_VERSION,
            encoding: self.encoding.name().to_owned(),
            entries: std::mem::take(&mut self.entries),
        };
        let mut f = BufWriter::new(File::create(&self.dict_path)?);
        bincode::serialize_into(&mut f, &directory)?;
        f.flush()?;
        tracing::debug!(path = %self.data_path.display(), terms = directory.entries.len(), bytes = self.offset, "postings store closed");
        Ok(())
    }
}

impl Drop for PostingsWriter {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                tracing::warn!(path = %self.data_path.display(), error = %e, "failed to close postings store");
            }
        }
    }
}

fn check_postings(term_id: TermId, postings: &[Posting]) -> Result<()> {
    if postings.is_empty() {
        return Err(Error::InvariantViolation(format!("empty postings list for term {term_id}")));
    }
    for pair in postings.windows(2) {
        if pair[1].doc_id <= pair[0].doc_id {
            return Err(Error::InvariantViolation(format!(
                "postings for term {term_id} not strictly ascending: {} then {}",
                pair[0].doc_id, pair[1].doc_id
            )));
        }
    }
    Ok(())
}

/// Read-only view of a finished store.
///
/// The directory is loaded once at open. Every lookup and every iterator
/// opens its own file handle, so concurrent readers never share a cursor.
pub struct PostingsStore {
    data_path: PathBuf,
    encoding: SharedEncoding,
    entries: Arc<[DirectoryEntry]>,
}

impl PostingsStore {
    pub fn open(dir: &Path, name: &str, encoding: SharedEncoding) -> Result<Self> {
        let data_path = data_path(dir, name);
        let dict_path = directory_path(dir, name);
        let directory: Directory = match File::open(&dict_path) {
            Ok(f) => bincode::deserialize_from(BufReader::new(f))
                .map_err(|e| Error::encoding(&dict_path, format!("unreadable directory: {e}")))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::Configuration(format!("no postings store at {}", dict_path.display())))
            }
            Err(e) => return Err(e.into()),
        };
        if directory.version != DIRECTORY_VERSION {
            return Err(Error::encoding(&dict_path, format!("unsupported directory version {}", directory.version)));
        }
        if directory.encoding != encoding.name() {
            return Err(Error::encoding(
                &dict_path,
                format!("written with {} encoding, opened with {}", directory.encoding, encoding.name()),
            ));
        }
        let data_len = fs::metadata(&data_path)?.len();
        validate_entries(&directory.entries, data_len).map_err(|reason| Error::encoding(&data_path, reason))?;
        Ok(Self { data_path, encoding, entries: directory.entries.into() })
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn encoding(&self) -> &SharedEncoding { &self.encoding }

    pub fn entries(&self) -> &[DirectoryEntry] { &self.entries }

    fn entry(&self, term_id: TermId) -> Option<&DirectoryEntry> {
        self.entries.binary_search_by_key(&term_id, |e| e.term_id).ok().map(|i| &self.entries[i])
    }

    /// Number of documents containing `term_id`, read from the directory; 0 if absent.
    pub fn document_frequency(&self, term_id: TermId) -> u32 {
        self.entry(term_id).map_or(0, |e| e.doc_count)
    }

    pub fn lookup(&self, term_id: TermId) -> Result<Vec<Posting>> {
        let entry = *self.entry(term_id).ok_or_else(|| Error::not_found(format!("term id {term_id}")))?;
        let mut f = File::open(&self.data_path)?;
        f.seek(SeekFrom::Start(entry.offset))?;
        let mut buf = vec![0u8; entry.len as usize];
        read_entry(&mut f, &mut buf, &self.data_path)?;
        decode_entry(&*self.encoding, &entry, &buf, &self.data_path)
    }

    /// Forward-only pass over every entry in stored order.
    pub fn iter(&self) -> Result<PostingsIter> {
        let reader = BufReader::new(File::open(&self.data_path)?);
        Ok(PostingsIter {
            reader,
            data_path: self.data_path.clone(),
            encoding: self.encoding.clone(),
            entries: self.entries.clone(),
            next: 0,
            failed: false,
        })
    }
}

fn validate_entries(entries: &[DirectoryEntry], data_len: u64) -> Result<(), String> {
    let mut expected_offset = 0u64;
    for (i, e) in entries.iter().enumerate() {
        if i > 0 && e.term_id <= entries[i - 1].term_id {
            return Err(format!("directory term ids not ascending at entry {i}"));
        }
        if e.offset != expected_offset {
            return Err(format!("entry {i} starts at {} instead of {expected_offset}", e.offset));
        }
        expected_offset += e.len as u64;
    }
    if expected_offset != data_len {
        return Err(format!("directory covers {expected_offset} bytes but data file has {data_len}"));
    }
    Ok(())
}

fn read_entry<R: Read>(r: &mut R, buf: &mut [u8], path: &Path) -> Result<()> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::encoding(path, "postings data truncated"),
        _ => Error::Io(e),
    })
}

fn decode_entry(
    encoding: &dyn crate::encoding::PostingsEncoding,
    entry: &DirectoryEntry,
    bytes: &[u8],
    path: &Path,
) -> Result<Vec<Posting>> {
    let postings = encoding
        .decode(bytes)
        .map_err(|reason| Error::encoding(path, format!("term {}: {reason}", entry.term_id)))?;
    if postings.len() != entry.doc_count as usize {
        return Err(Error::encoding(
            path,
            format!("term {}: decoded {} postings, directory says {}", entry.term_id, postings.len(), entry.doc_count),
        ));
    }
    Ok(postings)
}

/// Single-pass cursor over a store. Not restartable; open a new one with
/// [`PostingsStore::iter`]. Stops after the first error.
pub struct PostingsIter {
    reader: BufReader<File>,
    data_path: PathBuf,
    encoding: SharedEncoding,
    entries: Arc<[DirectoryEntry]>,
    next: usize,
    failed: bool,
}

impl PostingsIter {
    /// Term id of the entry the next call to `next` will return.
    pub fn peek_term(&self) -> Option<TermId> {
        if self.failed {
            return None;
        }
        self.entries.get(self.next).map(|e| e.term_id)
    }
}

impl Iterator for PostingsIter {
    type Item = Result<(TermId, Vec<Posting>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let entry = *self.entries.get(self.next)?;
        self.next += 1;
        let mut buf = vec![0u8; entry.len as usize];
        let result = read_entry(&mut self.reader, &mut buf, &self.data_path)
            .and_then(|_| decode_entry(&*self.encoding, &entry, &buf, &self.data_path))
            .map(|postings| (entry.term_id, postings));
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{default_encoding, VarBytePostings};
    use tempfile::tempdir;

    fn p(doc_id: u32, tf: u32) -> Posting { Posting::new(doc_id, tf) }

    fn write_sample(dir: &Path, encoding: SharedEncoding) {
        let mut w = PostingsWriter::create(dir, "sample", encoding).unwrap();
        w.append(1, &[p(0, 1), p(4, 2)]).unwrap();
        w.append(3, &[p(2, 1)]).unwrap();
        w.append(9, &[p(1, 5), p(2, 1), p(7, 1)]).unwrap();
        w.finish().unwrap();
    }

    #[test]
    fn lookup_and_iterate() {
        let dir = tempdir().unwrap();
        write_sample(dir.path(), default_encoding());
        let store = PostingsStore::open(dir.path(), "sample", default_encoding()).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.lookup(9).unwrap(), vec![p(1, 5), p(2, 1), p(7, 1)]);
        assert_eq!(store.document_frequency(1), 2);
        assert_eq!(store.document_frequency(2), 0);
        assert!(store.lookup(2).unwrap_err().is_not_found());

        let terms: Vec<TermId> = store.iter().unwrap().map(|r| r.unwrap().0).collect();
        assert_eq!(terms, vec![1, 3, 9]);
    }

    #[test]
    fn non_increasing_term_fails_fast() {
        let dir = tempdir().unwrap();
        let mut w = PostingsWriter::create(dir.path(), "bad", default_encoding()).unwrap();
        w.append(5, &[p(0, 1)]).unwrap();
        assert!(matches!(w.append(5, &[p(1, 1)]), Err(Error::InvariantViolation(_))));
        assert!(matches!(w.append(2, &[p(1, 1)]), Err(Error::InvariantViolation(_))));
        assert!(matches!(w.append(6, &[p(3, 1), p(3, 1)]), Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn dropped_writer_still_publishes_directory() {
        let dir = tempdir().unwrap();
        {
            let mut w = PostingsWriter::create(dir.path(), "dropped", default_encoding()).unwrap();
            w.append(0, &[p(3, 1)]).unwrap();
        }
        let store = PostingsStore::open(dir.path(), "dropped", default_encoding()).unwrap();
        assert_eq!(store.lookup(0).unwrap(), vec![p(3, 1)]);
    }

    #[test]
    fn encoding_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        write_sample(dir.path(), Arc::new(VarBytePostings));
        let err = PostingsStore::open(dir.path(), "sample", default_encoding()).err().unwrap();
        assert!(matches!(err, Error::Encoding { .. }));
    }

    #[test]
    fn truncated_data_is_an_encoding_error() {
        let dir = tempdir().unwrap();
        write_sample(dir.path(), default_encoding());
        let path = data_path(dir.path(), "sample");
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        let err = PostingsStore::open(dir.path(), "sample", default_encoding()).err().unwrap();
        assert!(matches!(err, Error::Encoding { .. }));
    }

    #[test]
    fn corrupt_entry_is_an_encoding_error() {
        let dir = tempdir().unwrap();
        write_sample(dir.path(), default_encoding());
        let path = data_path(dir.path(), "sample");
        let mut bytes = fs::read(&path).unwrap();
        // Count field of the first entry.
        bytes[0] = 7;
        fs::write(&path, &bytes).unwrap();
        let store = PostingsStore::open(dir.path(), "sample", default_encoding()).unwrap();
        assert!(matches!(store.lookup(1), Err(Error::Encoding { .. })));
        let mut iter = store.iter().unwrap();
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn missing_store_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        let err = PostingsStore::open(dir.path(), "nothing", default_encoding()).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
