//! # SortedSet - persisted sorted sets, storage handles and k-way merge
//!
//! Building blocks for the spilling sorted set in the `spillset` crate:
//!
//! * [`SortOrder`] / [`RewriteStrategy`] - shared element ordering and the
//!   collision policy used when an equal element is inserted again.
//! * [`RewritableOrderedSet`] - ordered in-memory set honouring both.
//! * [`Record`] - element encoding; `Option<T>` stores a null marker.
//! * [`RecordCodec`] - turns a sorted record stream into bytes with a count
//!   trailer. [`FramedCodec`] is the general one, [`KeyValueCodec`] a block
//!   codec with a sparse index for key and key/value records.
//! * [`StorageHandle`] / [`StorageHandleFactory`] - one backing file each;
//!   [`ScratchHandleFactory`] for local temp files and
//!   [`DirectoryHandleFactory`] for a named directory on a [`FileSystem`].
//! * [`PersistedFile`] - a sorted set that lives either in memory or in one
//!   file, with write/verify/load.
//! * [`MergeSortIterator`] / [`UnionSortedSet`] - many sorted sets read as
//!   one, duplicates coalesced.

mod codec;
mod error;
mod format;
mod fs;
mod handle;
mod keyed;
mod merge;
mod order;
mod persisted;
mod record;
mod rewritable;
mod scratch;
mod set;
mod union;

pub use codec::{BoundedReader, FramedCodec, RecordCodec, RecordRange, RecordReader, RecordWriter};
pub use error::{FetchKind, Result, SortedSetError};
pub use fs::{
    parse_file_name, DirectoryHandle, DirectoryHandleFactory, FileSystem, FsStatus,
    LocalFileSystem, FILE_NAME_PREFIX,
};
pub use handle::{ReadStream, StorageHandle, StorageHandleFactory, WriteStream};
pub use keyed::{KeyValueCodec, KeyValueRecord};
pub use merge::MergeSortIterator;
pub use order::{RewriteStrategy, SortOrder};
pub use persisted::{FileCursor, PersistedFile};
pub use record::Record;
pub use rewritable::RewritableOrderedSet;
pub use scratch::{ScratchHandle, ScratchHandleFactory};
pub use set::{SetCursor, SortedSet};
pub use union::UnionSortedSet;

#[cfg(test)]
mod tests;
