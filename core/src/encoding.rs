//! Binary encodings for postings lists.
//!
//! Both encodings store doc ids as gaps from the previous doc id (the first
//! gap is the doc id itself), each followed by the term frequency.

use crate::Posting;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read};
use std::sync::Arc;

/// Strategy for turning a postings list into bytes and back.
pub trait PostingsEncoding: Send + Sync {
    /// Stable identifier written next to the data so a store is never read
    /// with a different encoding than it was written with.
    fn name(&self) -> &'static str;

    fn encode(&self, postings: &[Posting]) -> Vec<u8>;

    /// Fails on truncated or trailing bytes, and on gaps that overflow a doc id.
    fn decode(&self, bytes: &[u8]) -> Result<Vec<Posting>, String>;
}

/// Fixed-width little-endian u32: `[count][gap tf]*`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UncompressedPostings;

impl PostingsEncoding for UncompressedPostings {
    fn name(&self) -> &'static str { "uncompressed" }

    fn encode(&self, postings: &[Posting]) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + postings.len() * 8);
        // Writes into a Vec cannot fail.
        let _ = out.write_u32::<LittleEndian>(postings.len() as u32);
        let mut prev = 0;
        for p in postings {
            let _ = out.write_u32::<LittleEndian>(p.doc_id.wrapping_sub(prev));
            let _ = out.write_u32::<LittleEndian>(p.tf);
            prev = p.doc_id;
        }
        out
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Posting>, String> {
        let mut rdr = Cursor::new(bytes);
        let count = rdr.read_u32::<LittleEndian>().map_err(|e| truncated(e, "count"))? as usize;
        if bytes.len() != 4 + count * 8 {
            return Err(format!("expected {} bytes for {count} postings, found {}", 4 + count * 8, bytes.len()));
        }
        let mut out = Vec::with_capacity(count);
        let mut prev: u32 = 0;
        for i in 0..count {
            let gap = rdr.read_u32::<LittleEndian>().map_err(|e| truncated(e, "gap"))?;
            let tf = rdr.read_u32::<LittleEndian>().map_err(|e| truncated(e, "tf"))?;
            prev = undelta(prev, gap, i)?;
            out.push(Posting::new(prev, tf));
        }
        Ok(out)
    }
}

/// Variable-byte (LEB128) stream: `[count][gap tf]*`, 7 bits per byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct VarBytePostings;

impl PostingsEncoding for VarBytePostings {
    fn name(&self) -> &'static str { "vbyte" }

    fn encode(&self, postings: &[Posting]) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + postings.len() * 2);
        write_vbyte(&mut out, postings.len() as u32);
        let mut prev = 0;
        for p in postings {
            write_vbyte(&mut out, p.doc_id.wrapping_sub(prev));
            write_vbyte(&mut out, p.tf);
            prev = p.doc_id;
        }
        out
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Posting>, String> {
        let mut rdr = Cursor::new(bytes);
        let count = read_vbyte(&mut rdr)? as usize;
        // Every posting needs at least two bytes; reject absurd counts before allocating.
        if count > bytes.len() {
            return Err(format!("count {count} exceeds payload of {} bytes", bytes.len()));
        }
        let mut out = Vec::with_capacity(count);
        let mut prev: u32 = 0;
        for i in 0..count {
            let gap = read_vbyte(&mut rdr)?;
            let tf = read_vbyte(&mut rdr)?;
            prev = undelta(prev, gap, i)?;
            out.push(Posting::new(prev, tf));
        }
        if (rdr.position() as usize) != bytes.len() {
            return Err(format!("{} trailing bytes", bytes.len() - rdr.position() as usize));
        }
        Ok(out)
    }
}

/// An encoding shared between a store, its cursors and parallel block writers.
pub type SharedEncoding = Arc<dyn PostingsEncoding>;

pub fn default_encoding() -> SharedEncoding {
    Arc::new(UncompressedPostings)
}

/// Looks up an encoding by its on-disk name.
pub fn by_name(name: &str) -> Option<SharedEncoding> {
    match name {
        "uncompressed" => Some(Arc::new(UncompressedPostings)),
        "vbyte" => Some(Arc::new(VarBytePostings)),
        _ => None,
    }
}

fn undelta(prev: u32, gap: u32, i: usize) -> Result<u32, String> {
    if i > 0 && gap == 0 {
        return Err(format!("zero gap at posting {i}"));
    }
    prev.checked_add(gap).ok_or_else(|| format!("doc id overflow at posting {i}"))
}

fn truncated(e: io::Error, field: &str) -> String {
    format!("truncated while reading {field}: {e}")
}

fn write_vbyte(out: &mut Vec<u8>, mut v: u32) {
    while v >= 0x80 {
        out.push((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

fn read_vbyte<R: Read>(rdr: &mut R) -> Result<u32, String> {
    let mut value: u32 = 0;
    for shift in (0..35).step_by(7) {
        let byte = rdr.read_u8().map_err(|e| truncated(e, "varint"))?;
        let bits = (byte & 0x7f) as u32;
        if shift == 28 && bits > 0x0f {
            return Err("varint overflows u32".into());
        }
        value |= bits << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err("varint longer than 5 bytes".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Posting> {
        vec![Posting::new(0, 3), Posting::new(7, 1), Posting::new(300, 2), Posting::new(u32::MAX, 9)]
    }

    fn encodings() -> Vec<Box<dyn PostingsEncoding>> {
        vec![Box::new(UncompressedPostings), Box::new(VarBytePostings)]
    }

    #[test]
    fn round_trip_empty_single_and_many() {
        for enc in encodings() {
            for list in [vec![], vec![Posting::new(42, 1)], sample()] {
                let bytes = enc.encode(&list);
                assert_eq!(enc.decode(&bytes).unwrap(), list, "{}", enc.name());
            }
        }
    }

    #[test]
    fn truncated_bytes_are_rejected() {
        for enc in encodings() {
            let bytes = enc.encode(&sample());
            assert!(enc.decode(&bytes[..bytes.len() - 1]).is_err(), "{}", enc.name());
            assert!(enc.decode(&[]).is_err(), "{}", enc.name());
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        for enc in encodings() {
            let mut bytes = enc.encode(&sample());
            bytes.push(0);
            assert!(enc.decode(&bytes).is_err(), "{}", enc.name());
        }
    }

    #[test]
    fn vbyte_is_smaller_for_dense_lists() {
        let list: Vec<Posting> = (0..100).map(|d| Posting::new(d, 1)).collect();
        assert!(VarBytePostings.encode(&list).len() < UncompressedPostings.encode(&list).len());
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(by_name("vbyte").unwrap().name(), "vbyte");
        assert!(by_name("gamma").is_none());
    }
}
