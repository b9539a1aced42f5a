use std::cmp::Ordering;
use std::fmt;
use std::io::Write;
use std::marker::PhantomData;

use crate::error::{Result, SortedSetError};
use crate::format::{self, Frame, TAG_ABSENT, TAG_TERMINATOR, TAG_VALUE};
use crate::handle::{ReadStream, WriteStream};
use crate::order::SortOrder;
use crate::record::Record;

/// Half-open element range `[from, to)`; `None` means unbounded.
#[derive(Clone)]
pub struct RecordRange<E> {
    pub from: Option<E>,
    pub to: Option<E>,
}

impl<E> RecordRange<E> {
    pub fn all() -> Self {
        Self { from: None, to: None }
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn before_start(&self, order: &SortOrder<E>, e: &E) -> bool {
        self.from
            .as_ref()
            .is_some_and(|f| order.compare(e, f) == Ordering::Less)
    }

    pub fn past_end(&self, order: &SortOrder<E>, e: &E) -> bool {
        self.to
            .as_ref()
            .is_some_and(|t| order.compare(e, t) != Ordering::Less)
    }

    pub fn contains(&self, order: &SortOrder<E>, e: &E) -> bool {
        !self.before_start(order, e) && !self.past_end(order, e)
    }
}

impl<E: Clone> RecordRange<E> {
    /// Range covered by both `self` and `[from, to)`.
    pub fn narrow(&self, order: &SortOrder<E>, from: Option<&E>, to: Option<&E>) -> Self {
        let from = match (self.from.as_ref(), from) {
            (Some(a), Some(b)) => Some(if order.compare(a, b) == Ordering::Greater { a } else { b }),
            (a, b) => a.or(b),
        };
        let to = match (self.to.as_ref(), to) {
            (Some(a), Some(b)) => Some(if order.compare(a, b) == Ordering::Less { a } else { b }),
            (a, b) => a.or(b),
        };
        Self {
            from: from.cloned(),
            to: to.cloned(),
        }
    }
}

impl<E> Default for RecordRange<E> {
    fn default() -> Self {
        Self::all()
    }
}

impl<E: fmt::Debug> fmt::Debug for RecordRange<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}, {:?})", self.from, self.to)
    }
}

/// Streaming writer produced by a [`RecordCodec`].
pub trait RecordWriter<E> {
    /// Appends one element; callers supply elements in ascending order.
    fn write_record(&mut self, e: &E) -> Result<()>;

    /// Writes the end marker and count, flushes, and returns the count.
    fn finish(self: Box<Self>) -> Result<usize>;
}

/// Streaming reader produced by a [`RecordCodec`].
pub trait RecordReader<E> {
    fn read_record(&mut self) -> Result<Option<E>>;
}

/// Translates between a sorted element stream and the bytes of one file.
pub trait RecordCodec<E>: fmt::Debug + Send + Sync {
    fn writer(&self, out: Box<dyn WriteStream>) -> Box<dyn RecordWriter<E>>;

    /// Reader over the elements of `range`, in order.
    fn reader(
        &self,
        input: Box<dyn ReadStream>,
        order: &SortOrder<E>,
        range: &RecordRange<E>,
    ) -> Result<Box<dyn RecordReader<E>>>;

    /// Element count of the whole file.
    fn read_count(&self, input: &mut dyn ReadStream) -> Result<usize>;
}

/// Generic codec: CRC-framed records followed by a raw count trailer. See
/// the `format` module for the layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct FramedCodec;

struct FramedWriter {
    out: Box<dyn WriteStream>,
    scratch: Vec<u8>,
    count: usize,
}

impl<E: Record> RecordWriter<E> for FramedWriter {
    fn write_record(&mut self, e: &E) -> Result<()> {
        if e.is_absent() {
            format::write_frame(&mut self.out, TAG_ABSENT, &[])?;
        } else {
            self.scratch.clear();
            e.encode(&mut self.scratch);
            format::write_frame(&mut self.out, TAG_VALUE, &self.scratch)?;
        }
        self.count += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<usize> {
        format::write_frame(&mut self.out, TAG_TERMINATOR, &[])?;
        format::write_count(&mut self.out, self.count)?;
        self.out.flush()?;
        Ok(self.count)
    }
}

struct FramedReader<E> {
    input: Box<dyn ReadStream>,
    buf: Vec<u8>,
    done: bool,
    _elem: PhantomData<fn() -> E>,
}

impl<E: Record> RecordReader<E> for FramedReader<E> {
    fn read_record(&mut self) -> Result<Option<E>> {
        if self.done {
            return Ok(None);
        }
        match format::read_frame(&mut self.input, &mut self.buf)? {
            Frame::Terminator => {
                self.done = true;
                Ok(None)
            }
            Frame::Absent => E::absent().map(Some).ok_or_else(|| {
                SortedSetError::Corrupt("null marker for a type with no absent value".into())
            }),
            Frame::Value => E::decode(&self.buf).map(Some),
        }
    }
}

impl<E: Record> RecordCodec<E> for FramedCodec {
    fn writer(&self, out: Box<dyn WriteStream>) -> Box<dyn RecordWriter<E>> {
        Box::new(FramedWriter {
            out,
            scratch: Vec::with_capacity(256),
            count: 0,
        })
    }

    fn reader(
        &self,
        input: Box<dyn ReadStream>,
        order: &SortOrder<E>,
        range: &RecordRange<E>,
    ) -> Result<Box<dyn RecordReader<E>>> {
        let reader: Box<dyn RecordReader<E>> = Box::new(FramedReader {
            input,
            buf: Vec::new(),
            done: false,
            _elem: PhantomData,
        });
        if range.is_unbounded() {
            return Ok(reader);
        }
        Ok(Box::new(BoundedReader::new(reader, order.clone(), range.clone())))
    }

    fn read_count(&self, input: &mut dyn ReadStream) -> Result<usize> {
        format::read_count(input)
    }
}

/// Filters a full-file reader down to a range: skips elements before `from`
/// and stops at the first element at or past `to`.
pub struct BoundedReader<E> {
    inner: Box<dyn RecordReader<E>>,
    order: SortOrder<E>,
    range: RecordRange<E>,
    started: bool,
    done: bool,
}

impl<E> BoundedReader<E> {
    pub fn new(inner: Box<dyn RecordReader<E>>, order: SortOrder<E>, range: RecordRange<E>) -> Self {
        Self {
            inner,
            order,
            range,
            started: false,
            done: false,
        }
    }
}

impl<E> RecordReader<E> for BoundedReader<E> {
    fn read_record(&mut self) -> Result<Option<E>> {
        while !self.done {
            let Some(e) = self.inner.read_record()? else {
                self.done = true;
                break;
            };
            if !self.started {
                if self.range.before_start(&self.order, &e) {
                    continue;
                }
                self.started = true;
            }
            if self.range.past_end(&self.order, &e) {
                self.done = true;
                break;
            }
            return Ok(Some(e));
        }
        Ok(None)
    }
}
