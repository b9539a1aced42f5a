//! Framed sorted-set file layout.
//!
//! ```text
//! [frame]* [terminator frame] [count: u32 BE]
//!
//! frame: [crc32: u32 LE][tag: u8][len: u32 LE][payload: len bytes]
//! ```
//!
//! The CRC32 covers `tag`, `len` and `payload`. Tags:
//!
//! * `TAG_VALUE` - an encoded element.
//! * `TAG_ABSENT` - the null/absent element; `len` is 0.
//! * `TAG_TERMINATOR` - end of records; `len` is 0.
//!
//! The count sits outside the framing as the last 4 bytes of the file so it
//! can be read by seeking to `length - 4`.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{Result, SortedSetError};

pub const TAG_ABSENT: u8 = 0;
pub const TAG_VALUE: u8 = 1;
pub const TAG_TERMINATOR: u8 = 0xFF;

/// Bytes of frame header: crc + tag + len.
pub const FRAME_HEADER_BYTES: usize = 4 + 1 + 4;

/// Bytes taken by the trailing count.
pub const COUNT_TRAILER_BYTES: u64 = 4;

/// Largest payload we'll allocate for on read (64 MiB). Guards against
/// corrupt length fields.
pub const MAX_RECORD_BYTES: usize = 64 * 1024 * 1024;

/// Kind of frame decoded by [`read_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Value,
    Absent,
    Terminator,
}

fn frame_crc(tag: u8, payload: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(&[tag]);
    hasher.update(&(payload.len() as u32).to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

pub fn write_frame<W: Write + ?Sized>(w: &mut W, tag: u8, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_RECORD_BYTES {
        return Err(SortedSetError::InvalidArgument(format!(
            "record of {} bytes exceeds the maximum of {MAX_RECORD_BYTES}",
            payload.len()
        )));
    }
    w.write_u32::<LittleEndian>(frame_crc(tag, payload))?;
    w.write_u8(tag)?;
    w.write_u32::<LittleEndian>(payload.len() as u32)?;
    w.write_all(payload)?;
    Ok(())
}

/// Reads one frame; the payload of a value frame is left in `buf`.
pub fn read_frame<R: Read + ?Sized>(r: &mut R, buf: &mut Vec<u8>) -> Result<Frame> {
    let stored_crc = match r.read_u32::<LittleEndian>() {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(SortedSetError::Corrupt(
                "record stream ended without a terminator".into(),
            ))
        }
        Err(e) => return Err(e.into()),
    };
    let tag = r.read_u8()?;
    let len = r.read_u32::<LittleEndian>()? as usize;
    if len > MAX_RECORD_BYTES {
        return Err(SortedSetError::Corrupt(format!(
            "record length {len} exceeds maximum {MAX_RECORD_BYTES}"
        )));
    }
    buf.clear();
    buf.resize(len, 0);
    r.read_exact(buf)?;

    let actual_crc = frame_crc(tag, buf);
    if actual_crc != stored_crc {
        return Err(SortedSetError::Corrupt(format!(
            "record checksum mismatch (expected {stored_crc:#010x}, got {actual_crc:#010x})"
        )));
    }

    match (tag, len) {
        (TAG_VALUE, _) => Ok(Frame::Value),
        (TAG_ABSENT, 0) => Ok(Frame::Absent),
        (TAG_TERMINATOR, 0) => Ok(Frame::Terminator),
        _ => Err(SortedSetError::Corrupt(format!(
            "unexpected frame tag {tag:#04x} with {len} byte payload"
        ))),
    }
}

pub fn write_count<W: Write + ?Sized>(w: &mut W, count: usize) -> Result<()> {
    let count = u32::try_from(count).map_err(|_| {
        SortedSetError::InvalidArgument(format!("{count} elements do not fit the count trailer"))
    })?;
    w.write_u32::<BigEndian>(count)?;
    Ok(())
}

/// Reads the trailing element count from the last 4 bytes. Anything shorter
/// than a terminator frame plus the count cannot be a complete file.
pub fn read_count<R: Read + Seek + ?Sized>(r: &mut R) -> Result<usize> {
    let filesize = r.seek(SeekFrom::End(0))?;
    if filesize < FRAME_HEADER_BYTES as u64 + COUNT_TRAILER_BYTES {
        return Err(SortedSetError::Corrupt(format!(
            "file of {filesize} bytes is too small for a terminator and count trailer"
        )));
    }
    r.seek(SeekFrom::End(-(COUNT_TRAILER_BYTES as i64)))?;
    Ok(r.read_u32::<BigEndian>()? as usize)
}
