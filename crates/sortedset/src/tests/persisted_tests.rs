use std::sync::Arc;

use config::PersistOptions;

use super::helpers::{mem, numbers, persisted_numbers, BrokenHandle, DiscardingHandle, MemHandle};
use crate::*;

// -------------------- Persist / Load --------------------

#[test]
fn persist_then_load_round_trips() -> anyhow::Result<()> {
    let (raw, mut set) = persisted_numbers(&[5, 3, 9, 1]);
    assert!(set.is_persisted());
    assert!(raw.exists());

    set.load()?;
    assert!(!set.is_persisted());
    assert!(!raw.exists(), "load deletes the backing file");
    assert_eq!(set.to_vec()?, vec![1, 3, 5, 9]);
    Ok(())
}

#[test]
fn persist_twice_is_noop() -> anyhow::Result<()> {
    let (raw, mut set) = persisted_numbers(&[1, 2]);
    let before = raw.bytes();
    let (other, handle) = mem();
    set.persist(handle)?;
    assert!(!other.exists());
    assert_eq!(raw.bytes(), before);
    Ok(())
}

#[test]
fn repersist_writes_back_to_same_handle() -> anyhow::Result<()> {
    let (raw, mut set) = persisted_numbers(&[1, 2, 3]);
    set.load()?;
    set.add(4)?;
    set.repersist()?;
    assert!(raw.exists());
    assert_eq!(set.len()?, 4);
    Ok(())
}

#[test]
fn null_elements_survive_persist() -> anyhow::Result<()> {
    let mut set: PersistedFile<Option<u64>> = PersistedFile::new(SortOrder::natural());
    set.add(Some(2))?;
    set.add(None)?;
    let (_raw, handle) = mem();
    set.persist(handle)?;
    assert_eq!(set.first()?, None);
    set.load()?;
    assert_eq!(set.to_vec()?, vec![None, Some(2)]);
    Ok(())
}

// -------------------- Persisted reads --------------------

#[test]
fn size_comes_from_count_trailer() -> anyhow::Result<()> {
    let (_raw, set) = persisted_numbers(&[1, 2, 3, 4, 5]);
    assert_eq!(set.len()?, 5);
    assert!(!set.is_empty()?);
    Ok(())
}

#[test]
fn first_last_contains_read_the_file() -> anyhow::Result<()> {
    let (_raw, set) = persisted_numbers(&[10, 20, 30]);
    assert_eq!(set.first()?, 10);
    assert_eq!(set.last()?, 30);
    assert!(set.contains(&20)?);
    assert!(!set.contains(&25)?);
    assert!(!set.contains(&99)?);
    Ok(())
}

#[test]
fn contains_all_makes_one_pass() -> anyhow::Result<()> {
    let (_raw, set) = persisted_numbers(&[1, 3, 5, 7]);
    assert!(set.contains_all(&[7, 1, 5])?);
    assert!(!set.contains_all(&[1, 4])?);
    assert!(!set.contains_all(&[8])?);
    assert!(set.contains_all(&[])?);
    Ok(())
}

#[test]
fn empty_persisted_set_fetches_fail() -> anyhow::Result<()> {
    let (_raw, set) = persisted_numbers(&[]);
    assert!(set.is_empty()?);
    assert_eq!(set.len()?, 0);
    assert!(matches!(
        set.first(),
        Err(SortedSetError::NoSuchElement(FetchKind::First))
    ));
    assert!(matches!(
        set.last(),
        Err(SortedSetError::NoSuchElement(FetchKind::Last))
    ));
    let mut cursor = set.cursor()?;
    assert!(matches!(
        cursor.next_required(),
        Err(SortedSetError::NoSuchElement(FetchKind::Next))
    ));
    Ok(())
}

#[test]
fn mutating_persisted_set_is_illegal_state() {
    let (_raw, mut set) = persisted_numbers(&[1]);
    assert!(matches!(set.add(2), Err(SortedSetError::IllegalState(_))));
    assert!(matches!(set.remove(&1), Err(SortedSetError::IllegalState(_))));
    assert!(matches!(
        set.add_all(vec![3, 4]),
        Err(SortedSetError::IllegalState(_))
    ));
    assert!(matches!(
        set.remove_if(|_| true),
        Err(SortedSetError::IllegalState(_))
    ));
    let msg = set.add(5).unwrap_err().to_string();
    assert!(msg.contains("load()"), "{msg}");
}

#[test]
fn file_cursor_closes_when_exhausted() -> anyhow::Result<()> {
    let (raw, handle) = mem();
    let mut set = numbers(&[1, 2]);
    set.persist(handle)?;
    let input = raw.open_read()?;
    let reader = RecordCodec::<u64>::reader(&FramedCodec, input, &SortOrder::natural(), &RecordRange::all())?;
    let mut cursor = FileCursor::new(reader);
    assert!(cursor.is_open());
    assert_eq!(cursor.next_record()?, Some(1));
    assert_eq!(cursor.next_record()?, Some(2));
    assert_eq!(cursor.next_record()?, None);
    assert!(!cursor.is_open());
    assert_eq!(cursor.next_record()?, None);
    Ok(())
}

// -------------------- Failure handling --------------------

#[test]
fn unwritable_handle_leaves_set_in_memory() -> anyhow::Result<()> {
    let mut set = numbers(&[1, 2, 3]);
    let err = set.persist(Arc::new(BrokenHandle)).unwrap_err();
    assert!(err.is_transient());
    assert!(!set.is_persisted());
    assert!(set.handle().is_none());
    assert_eq!(set.to_vec()?, vec![1, 2, 3]);

    let (_raw, handle) = mem();
    set.persist(handle)?;
    assert_eq!(set.len()?, 3);
    Ok(())
}

#[test]
fn count_mismatch_fails_verification_and_deletes_file() -> anyhow::Result<()> {
    // reads see a count trailer one higher than written
    let raw = MemHandle::tampered(|b| {
        let n = b.len();
        b[n - 1] = b[n - 1].wrapping_add(1);
    });
    let mut set = numbers(&[1, 2, 3]);
    let err = set.persist(Arc::new(raw.clone())).unwrap_err();
    assert!(matches!(err, SortedSetError::Verification(_)), "{err}");
    assert!(err.is_transient());
    assert!(!raw.exists(), "partial file is removed");
    assert!(!set.is_persisted());
    assert_eq!(set.to_vec()?, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn sampled_element_mismatch_fails_verification() {
    // swap the first payload byte of the first record, with a valid crc
    let raw = MemHandle::tampered(|b| {
        let payload = b[9..17].to_vec();
        let mut changed = payload.clone();
        changed[7] ^= 0x01;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&b[4..9]);
        hasher.update(&changed);
        b[..4].copy_from_slice(&hasher.finalize().to_le_bytes());
        b[9..17].copy_from_slice(&changed);
    });
    let mut set = numbers(&[2, 4]);
    let err = set.persist(Arc::new(raw)).unwrap_err();
    assert!(matches!(err, SortedSetError::Verification(_)), "{err}");
}

#[test]
fn disabled_verification_skips_count_check() -> anyhow::Result<()> {
    let raw = MemHandle::tampered(|b| {
        let n = b.len();
        b[n - 1] = b[n - 1].wrapping_add(1);
    });
    let mut set = PersistedFile::new(SortOrder::natural()).with_options(PersistOptions::verify(false));
    set.add(1u64)?;
    set.persist(Arc::new(raw))?;
    assert!(set.is_persisted());
    Ok(())
}

#[test]
fn empty_file_fails_even_without_verification() {
    let mut set = PersistedFile::new(SortOrder::natural()).with_options(PersistOptions::verify(false));
    set.add(1u64).unwrap();
    let err = set.persist(Arc::new(DiscardingHandle)).unwrap_err();
    assert!(matches!(err, SortedSetError::Verification(_)), "{err}");
    assert!(!set.is_persisted());
    assert_eq!(set.to_vec().unwrap(), vec![1]);
}

// -------------------- load_retaining / unload --------------------

#[test]
fn unload_after_load_retaining() -> anyhow::Result<()> {
    let (raw, mut set) = persisted_numbers(&[1, 2, 3]);
    set.load_retaining()?;
    assert!(!set.is_persisted());
    assert!(raw.exists(), "file kept");
    assert_eq!(set.to_vec()?, vec![1, 2, 3]);

    set.unload()?;
    assert!(set.is_persisted());
    assert_eq!(set.len()?, 3);
    Ok(())
}

#[test]
fn unload_without_retained_file_is_illegal() -> anyhow::Result<()> {
    let (_raw, mut set) = persisted_numbers(&[1]);
    set.load()?;
    assert!(matches!(set.unload(), Err(SortedSetError::IllegalState(_))));
    Ok(())
}

#[test]
fn mutating_retained_set_drops_stale_file() -> anyhow::Result<()> {
    let (raw, mut set) = persisted_numbers(&[1, 2]);
    set.load_retaining()?;
    set.add(3)?;
    assert!(!raw.exists());
    assert!(matches!(set.unload(), Err(SortedSetError::IllegalState(_))));
    Ok(())
}

// -------------------- Range views --------------------

#[test]
fn persisted_view_reads_bounded_range() -> anyhow::Result<()> {
    let (_raw, set) = persisted_numbers(&[1, 2, 3, 4, 5, 6]);
    let view = set.sub_set(&2, &5);
    assert!(view.is_persisted());
    assert!(view.is_view());
    assert_eq!(view.to_vec()?, vec![2, 3, 4]);
    assert_eq!(view.first()?, 2);
    assert_eq!(view.last()?, 4);
    assert!(!view.contains(&5)?);
    assert!(matches!(view.len(), Err(SortedSetError::IllegalState(_))));

    assert_eq!(set.head_set(&3).to_vec()?, vec![1, 2]);
    assert_eq!(set.tail_set(&5).to_vec()?, vec![5, 6]);
    Ok(())
}

#[test]
fn nested_views_narrow() -> anyhow::Result<()> {
    let (_raw, set) = persisted_numbers(&[1, 2, 3, 4, 5, 6]);
    let view = set.tail_set(&2).head_set(&6).sub_set(&1, &4);
    assert_eq!(view.to_vec()?, vec![2, 3]);
    Ok(())
}

#[test]
fn view_clear_and_load_leave_shared_file() -> anyhow::Result<()> {
    let (raw, set) = persisted_numbers(&[1, 2, 3, 4]);
    let mut view = set.head_set(&3);
    view.load()?;
    assert_eq!(view.to_vec()?, vec![1, 2]);
    assert!(raw.exists());

    let mut other = set.tail_set(&3);
    other.clear()?;
    assert!(raw.exists());
    assert_eq!(set.len()?, 4);
    Ok(())
}

#[test]
fn in_memory_views_are_copies() -> anyhow::Result<()> {
    let set = numbers(&[1, 2, 3, 4]);
    let mut sub = set.sub_set(&2, &4);
    assert!(!sub.is_persisted());
    sub.add(10)?;
    assert_eq!(sub.to_vec()?, vec![2, 3, 10]);
    assert_eq!(set.len()?, 4);
    Ok(())
}

// -------------------- Clear / persist_from --------------------

#[test]
fn clear_deletes_persisted_file() -> anyhow::Result<()> {
    let (raw, mut set) = persisted_numbers(&[1, 2]);
    set.clear()?;
    assert!(!raw.exists());
    assert!(!set.is_persisted());
    assert!(set.is_empty()?);
    set.add(7)?;
    Ok(())
}

#[test]
fn persist_from_streams_without_memory() -> anyhow::Result<()> {
    let template = numbers(&[]);
    let mut set = template.sibling();
    let (raw, handle) = mem();
    set.persist_from(handle, (0..500u64).map(Ok))?;
    assert!(set.is_persisted());
    assert!(raw.exists());
    assert_eq!(set.len()?, 500);
    assert_eq!(set.last()?, 499);
    Ok(())
}

#[test]
fn persist_from_source_error_discards_file() {
    let mut set = numbers(&[]);
    let (raw, handle) = mem();
    let source = vec![Ok(1u64), Err(SortedSetError::Corrupt("bad source".into()))];
    assert!(set.persist_from(handle, source).is_err());
    assert!(!raw.exists());
    assert!(!set.is_persisted());
}

#[test]
fn persist_from_requires_empty_set() {
    let mut set = numbers(&[1]);
    let (_raw, handle) = mem();
    let res = set.persist_from(handle, Vec::<Result<u64>>::new());
    assert!(matches!(res, Err(SortedSetError::IllegalState(_))));
}

#[test]
fn scratch_handle_persist_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let factory = ScratchHandleFactory::in_dir(dir.path());
    let mut set = numbers(&[3, 1, 2]);
    set.persist(factory.create_handle()?)?;
    assert!(set.handle().unwrap().size() > 0);
    set.load()?;
    assert_eq!(set.to_vec()?, vec![1, 2, 3]);
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

#[test]
fn scratch_handle_reused_after_load() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let factory = ScratchHandleFactory::in_dir(dir.path());
    let handle = factory.create_handle()?;
    let mut set = numbers(&[3, 1, 2]);
    set.persist(Arc::clone(&handle))?;

    set.load()?;
    set.remove(&2)?;
    set.repersist()?;
    assert!(set.is_persisted());
    assert!(Arc::ptr_eq(set.handle().unwrap(), &handle));
    assert_eq!(set.len()?, 2);
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
    Ok(())
}
