//! Sorted key/value file codec with a sparse index.
//!
//! ```text
//! [DATA]   entry*          kind = 0, one per element, in order
//!          count entry     kind = 1, empty key, value = count (u64 BE)
//! [INDEX]  n: u32, then n x [key_len: u32][key][val_len: u32][val][offset: u64]
//! [FOOTER] index_offset: u64 | magic: u32 = "SSKV"
//!
//! entry: [crc32: u32][kind: u8][key_len: u32][key][val_len: u32][val]
//! ```
//!
//! Integers are little-endian unless noted. The CRC32 covers everything
//! after itself. The count entry is ranked after every data entry, so a
//! reader treats it as the end of the data. Every [`INDEX_INTERVAL`]th data
//! entry is indexed; a range read seeks to the last indexed entry at or
//! before `from` and scans from there.

use std::cmp::Ordering;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;

use crate::codec::{BoundedReader, RecordCodec, RecordRange, RecordReader, RecordWriter};
use crate::error::{Result, SortedSetError};
use crate::format::MAX_RECORD_BYTES;
use crate::handle::{ReadStream, WriteStream};
use crate::order::SortOrder;
use crate::record::Record;

/// Magic number identifying key/value files (ASCII "SSKV").
pub const KV_MAGIC: u32 = 0x5353_4B56;

/// Footer size: 8 (`index_offset`) + 4 (`magic`).
pub const KV_FOOTER_BYTES: u64 = 8 + 4;

/// One index entry per this many data entries.
pub const INDEX_INTERVAL: usize = 32;

const KIND_DATA: u8 = 0;
const KIND_COUNT: u8 = 1;

/// Size of the count entry: crc + kind + key_len + val_len + u64 count.
const COUNT_ENTRY_BYTES: u64 = 4 + 1 + 4 + 4 + 8;

/// Element made of a key and an optional value, stored as raw bytes.
pub trait KeyValueRecord: Record {
    fn key(&self) -> &[u8];

    fn value(&self) -> &[u8];

    fn from_parts(key: Vec<u8>, value: Vec<u8>) -> Self;
}

impl KeyValueRecord for Vec<u8> {
    fn key(&self) -> &[u8] {
        self
    }

    fn value(&self) -> &[u8] {
        &[]
    }

    fn from_parts(key: Vec<u8>, _value: Vec<u8>) -> Self {
        key
    }
}

impl KeyValueRecord for (Vec<u8>, Vec<u8>) {
    fn key(&self) -> &[u8] {
        &self.0
    }

    fn value(&self) -> &[u8] {
        &self.1
    }

    fn from_parts(key: Vec<u8>, value: Vec<u8>) -> Self {
        (key, value)
    }
}

/// Codec for [`KeyValueRecord`] elements. See the module docs for the layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyValueCodec;

fn entry_crc(kind: u8, key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(&[kind]);
    hasher.update(&(key.len() as u32).to_le_bytes());
    hasher.update(key);
    hasher.update(&(value.len() as u32).to_le_bytes());
    hasher.update(value);
    hasher.finalize()
}

fn write_entry<W: Write + ?Sized>(w: &mut W, kind: u8, key: &[u8], value: &[u8]) -> io::Result<u64> {
    w.write_u32::<LittleEndian>(entry_crc(kind, key, value))?;
    w.write_u8(kind)?;
    w.write_u32::<LittleEndian>(key.len() as u32)?;
    w.write_all(key)?;
    w.write_u32::<LittleEndian>(value.len() as u32)?;
    w.write_all(value)?;
    Ok(4 + 1 + 4 + key.len() as u64 + 4 + value.len() as u64)
}

fn read_bytes<R: Read + ?Sized>(r: &mut R, what: &str) -> Result<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if len > MAX_RECORD_BYTES {
        return Err(SortedSetError::Corrupt(format!(
            "{what} length {len} exceeds maximum {MAX_RECORD_BYTES}"
        )));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_entry<R: Read + ?Sized>(r: &mut R) -> Result<(u8, Vec<u8>, Vec<u8>)> {
    let stored_crc = r.read_u32::<LittleEndian>()?;
    let kind = r.read_u8()?;
    let key = read_bytes(r, "key")?;
    let value = read_bytes(r, "value")?;
    let actual_crc = entry_crc(kind, &key, &value);
    if actual_crc != stored_crc {
        return Err(SortedSetError::Corrupt(format!(
            "entry checksum mismatch (expected {stored_crc:#010x}, got {actual_crc:#010x})"
        )));
    }
    Ok((kind, key, value))
}

fn read_index_offset(input: &mut dyn ReadStream) -> Result<u64> {
    let filesize = input.seek(SeekFrom::End(0))?;
    if filesize < KV_FOOTER_BYTES + COUNT_ENTRY_BYTES {
        return Err(SortedSetError::Corrupt(format!(
            "file of {filesize} bytes is too small for a key/value footer"
        )));
    }
    input.seek(SeekFrom::End(-(KV_FOOTER_BYTES as i64)))?;
    let index_offset = input.read_u64::<LittleEndian>()?;
    let magic = input.read_u32::<LittleEndian>()?;
    if magic != KV_MAGIC {
        return Err(SortedSetError::Corrupt(format!(
            "unknown key/value magic: {magic:#x}"
        )));
    }
    if index_offset < COUNT_ENTRY_BYTES || index_offset > filesize - KV_FOOTER_BYTES {
        return Err(SortedSetError::Corrupt(format!(
            "invalid index offset {index_offset}"
        )));
    }
    Ok(index_offset)
}

struct KvWriter {
    out: Box<dyn WriteStream>,
    position: u64,
    count: usize,
    index: Vec<(Vec<u8>, Vec<u8>, u64)>,
}

impl<E: KeyValueRecord> RecordWriter<E> for KvWriter {
    fn write_record(&mut self, e: &E) -> Result<()> {
        if e.is_absent() {
            return Err(SortedSetError::InvalidArgument(
                "key/value files cannot hold an absent element".into(),
            ));
        }
        if self.count % INDEX_INTERVAL == 0 {
            self.index
                .push((e.key().to_vec(), e.value().to_vec(), self.position));
        }
        self.position += write_entry(&mut self.out, KIND_DATA, e.key(), e.value())?;
        self.count += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<usize> {
        let mut count_bytes = [0u8; 8];
        BigEndian::write_u64(&mut count_bytes, self.count as u64);
        self.position += write_entry(&mut self.out, KIND_COUNT, &[], &count_bytes)?;

        let index_offset = self.position;
        self.out.write_u32::<LittleEndian>(self.index.len() as u32)?;
        for (key, value, offset) in &self.index {
            self.out.write_u32::<LittleEndian>(key.len() as u32)?;
            self.out.write_all(key)?;
            self.out.write_u32::<LittleEndian>(value.len() as u32)?;
            self.out.write_all(value)?;
            self.out.write_u64::<LittleEndian>(*offset)?;
        }

        self.out.write_u64::<LittleEndian>(index_offset)?;
        self.out.write_u32::<LittleEndian>(KV_MAGIC)?;
        self.out.flush()?;
        Ok(self.count)
    }
}

struct KvReader<E> {
    input: Box<dyn ReadStream>,
    done: bool,
    _elem: PhantomData<fn() -> E>,
}

impl<E: KeyValueRecord> RecordReader<E> for KvReader<E> {
    fn read_record(&mut self) -> Result<Option<E>> {
        if self.done {
            return Ok(None);
        }
        let (kind, key, value) = read_entry(&mut self.input)?;
        match kind {
            KIND_DATA => Ok(Some(E::from_parts(key, value))),
            KIND_COUNT => {
                self.done = true;
                Ok(None)
            }
            other => Err(SortedSetError::Corrupt(format!("unknown entry kind {other}"))),
        }
    }
}

impl KeyValueCodec {
    /// Data offset to start scanning from for elements `>= from`.
    fn seek_offset<E: KeyValueRecord>(
        input: &mut dyn ReadStream,
        order: &SortOrder<E>,
        from: &E,
    ) -> Result<u64> {
        let index_offset = read_index_offset(input)?;
        input.seek(SeekFrom::Start(index_offset))?;
        let n = input.read_u32::<LittleEndian>()? as usize;
        let mut start = 0u64;
        for _ in 0..n {
            let key = read_bytes(input, "index key")?;
            let value = read_bytes(input, "index value")?;
            let offset = input.read_u64::<LittleEndian>()?;
            let probe = E::from_parts(key, value);
            if order.compare(&probe, from) == Ordering::Greater {
                break;
            }
            start = offset;
        }
        Ok(start)
    }
}

impl<E: KeyValueRecord> RecordCodec<E> for KeyValueCodec {
    fn writer(&self, out: Box<dyn WriteStream>) -> Box<dyn RecordWriter<E>> {
        Box::new(KvWriter {
            out,
            position: 0,
            count: 0,
            index: Vec::new(),
        })
    }

    fn reader(
        &self,
        mut input: Box<dyn ReadStream>,
        order: &SortOrder<E>,
        range: &RecordRange<E>,
    ) -> Result<Box<dyn RecordReader<E>>> {
        let start = match &range.from {
            Some(from) => Self::seek_offset(input.as_mut(), order, from)?,
            None => 0,
        };
        input.seek(SeekFrom::Start(start))?;
        let reader: Box<dyn RecordReader<E>> = Box::new(KvReader {
            input,
            done: false,
            _elem: PhantomData,
        });
        if range.is_unbounded() {
            return Ok(reader);
        }
        Ok(Box::new(BoundedReader::new(reader, order.clone(), range.clone())))
    }

    fn read_count(&self, input: &mut dyn ReadStream) -> Result<usize> {
        let index_offset = read_index_offset(input)?;
        input.seek(SeekFrom::Start(index_offset - COUNT_ENTRY_BYTES))?;
        let (kind, _key, value) = read_entry(input)?;
        if kind != KIND_COUNT || value.len() != 8 {
            return Err(SortedSetError::Corrupt("missing count entry".into()));
        }
        Ok(BigEndian::read_u64(&value) as usize)
    }
}
