use std::sync::Arc;

use super::helpers::{mem, MemHandle};
use crate::format::{COUNT_TRAILER_BYTES, FRAME_HEADER_BYTES};
use crate::keyed::INDEX_INTERVAL;
use crate::*;

type Pair = (Vec<u8>, Vec<u8>);

fn write_with<E: Record>(
    codec: &dyn RecordCodec<E>,
    handle: &dyn StorageHandle,
    items: &[E],
) -> anyhow::Result<usize> {
    let mut w = codec.writer(handle.open_write()?);
    for e in items {
        w.write_record(e)?;
    }
    Ok(w.finish()?)
}

fn read_with<E: Record>(
    codec: &dyn RecordCodec<E>,
    handle: &dyn StorageHandle,
    order: &SortOrder<E>,
    range: RecordRange<E>,
) -> anyhow::Result<Vec<E>> {
    let mut r = codec.reader(handle.open_read()?, order, &range)?;
    let mut out = Vec::new();
    while let Some(e) = r.read_record()? {
        out.push(e);
    }
    Ok(out)
}

// -------------------- Framed format --------------------

#[test]
fn framed_round_trip() -> anyhow::Result<()> {
    let (raw, handle) = mem();
    let items: Vec<u64> = (0..50).collect();
    assert_eq!(write_with::<u64>(&FramedCodec, handle.as_ref(), &items)?, 50);

    let back = read_with::<u64>(&FramedCodec, handle.as_ref(), &SortOrder::natural(), RecordRange::all())?;
    assert_eq!(back, items);
    assert!(raw.size() > 0);
    Ok(())
}

#[test]
fn count_is_last_four_bytes_big_endian() -> anyhow::Result<()> {
    let (raw, handle) = mem();
    write_with::<u64>(&FramedCodec, handle.as_ref(), &[10, 20, 30])?;
    let bytes = raw.bytes().unwrap();
    let tail = &bytes[bytes.len() - COUNT_TRAILER_BYTES as usize..];
    assert_eq!(tail, &3u32.to_be_bytes());

    let mut input = handle.open_read()?;
    assert_eq!(RecordCodec::<u64>::read_count(&FramedCodec, input.as_mut())?, 3);
    Ok(())
}

#[test]
fn bare_count_without_terminator_is_corrupt() -> anyhow::Result<()> {
    let (raw, handle) = mem();
    raw.set_bytes(3u32.to_be_bytes().to_vec());
    let mut input = handle.open_read()?;
    let res = RecordCodec::<u64>::read_count(&FramedCodec, input.as_mut());
    assert!(matches!(res, Err(SortedSetError::Corrupt(_))));
    Ok(())
}

#[test]
fn empty_file_still_has_terminator_and_count() -> anyhow::Result<()> {
    let (raw, handle) = mem();
    write_with::<u64>(&FramedCodec, handle.as_ref(), &[])?;
    let len = raw.bytes().unwrap().len();
    assert_eq!(len, FRAME_HEADER_BYTES + COUNT_TRAILER_BYTES as usize);
    let back =
        read_with::<u64>(&FramedCodec, handle.as_ref(), &SortOrder::natural(), RecordRange::all())?;
    assert!(back.is_empty());
    Ok(())
}

#[test]
fn absent_element_round_trips_via_marker() -> anyhow::Result<()> {
    let (_raw, handle) = mem();
    let items = vec![None, Some(1u64), Some(5)];
    write_with::<Option<u64>>(&FramedCodec, handle.as_ref(), &items)?;
    let back = read_with::<Option<u64>>(&FramedCodec, handle.as_ref(), &SortOrder::natural(), RecordRange::all())?;
    assert_eq!(back, items);
    Ok(())
}

#[test]
fn pairs_and_strings_round_trip() -> anyhow::Result<()> {
    let (_raw, handle) = mem();
    let items = vec![
        ("a".to_string(), 2u64),
        ("bb".to_string(), 1),
        (String::new(), 9),
    ];
    write_with::<(String, u64)>(&FramedCodec, handle.as_ref(), &items)?;
    let back =
        read_with::<(String, u64)>(&FramedCodec, handle.as_ref(), &SortOrder::natural(), RecordRange::all())?;
    assert_eq!(back, items);
    Ok(())
}

#[test]
fn flipped_payload_byte_is_corrupt() -> anyhow::Result<()> {
    let (raw, handle) = mem();
    write_with::<u64>(&FramedCodec, handle.as_ref(), &[1, 2, 3])?;
    let mut bytes = raw.bytes().unwrap();
    bytes[FRAME_HEADER_BYTES] ^= 0xFF;
    raw.set_bytes(bytes);

    let err = read_with::<u64>(&FramedCodec, handle.as_ref(), &SortOrder::natural(), RecordRange::all())
        .unwrap_err();
    let err = err.downcast::<SortedSetError>()?;
    assert!(matches!(err, SortedSetError::Corrupt(_)), "{err}");
    Ok(())
}

#[test]
fn truncated_stream_is_corrupt() -> anyhow::Result<()> {
    let (raw, handle) = mem();
    write_with::<u64>(&FramedCodec, handle.as_ref(), &[1, 2, 3])?;
    let bytes = raw.bytes().unwrap();
    // keep exactly the first two frames
    let frame = FRAME_HEADER_BYTES + 8;
    raw.set_bytes(bytes[..2 * frame].to_vec());

    let mut r = RecordCodec::<u64>::reader(
        &FramedCodec,
        handle.open_read()?,
        &SortOrder::natural(),
        &RecordRange::all(),
    )?;
    assert_eq!(r.read_record()?, Some(1));
    assert_eq!(r.read_record()?, Some(2));
    assert!(matches!(r.read_record(), Err(SortedSetError::Corrupt(_))));
    Ok(())
}

#[test]
fn absent_marker_for_plain_type_is_corrupt() -> anyhow::Result<()> {
    let (_raw, handle) = mem();
    write_with::<Option<u64>>(&FramedCodec, handle.as_ref(), &[None])?;
    let mut r = RecordCodec::<u64>::reader(
        &FramedCodec,
        handle.open_read()?,
        &SortOrder::natural(),
        &RecordRange::all(),
    )?;
    assert!(matches!(r.read_record(), Err(SortedSetError::Corrupt(_))));
    Ok(())
}

#[test]
fn bounded_read_is_half_open() -> anyhow::Result<()> {
    let (_raw, handle) = mem();
    let items: Vec<u64> = (0..20).collect();
    write_with::<u64>(&FramedCodec, handle.as_ref(), &items)?;
    let range = RecordRange {
        from: Some(5u64),
        to: Some(9),
    };
    let back = read_with::<u64>(&FramedCodec, handle.as_ref(), &SortOrder::natural(), range)?;
    assert_eq!(back, vec![5, 6, 7, 8]);
    Ok(())
}

#[test]
fn decode_rejects_wrong_width() {
    assert!(matches!(u64::decode(&[1, 2, 3]), Err(SortedSetError::Corrupt(_))));
    assert!(matches!(
        String::decode(&[0xFF, 0xFE]),
        Err(SortedSetError::Corrupt(_))
    ));
}

// -------------------- Key/value codec --------------------

fn pairs(n: usize) -> Vec<Pair> {
    (0..n)
        .map(|i| {
            (
                format!("key{i:05}").into_bytes(),
                format!("val{i}").into_bytes(),
            )
        })
        .collect()
}

#[test]
fn key_value_round_trip_and_count() -> anyhow::Result<()> {
    let (_raw, handle) = mem();
    let items = pairs(200);
    write_with::<Pair>(&KeyValueCodec, handle.as_ref(), &items)?;

    let order: SortOrder<Pair> = SortOrder::natural();
    let back = read_with::<Pair>(&KeyValueCodec, handle.as_ref(), &order, RecordRange::all())?;
    assert_eq!(back, items);

    let mut input = handle.open_read()?;
    let count = RecordCodec::<Pair>::read_count(&KeyValueCodec, input.as_mut())?;
    assert_eq!(count, 200);
    Ok(())
}

#[test]
fn key_value_range_seeks_into_middle_block() -> anyhow::Result<()> {
    let (_raw, handle) = mem();
    let items = pairs(INDEX_INTERVAL * 4);
    write_with::<Pair>(&KeyValueCodec, handle.as_ref(), &items)?;

    let from = items[INDEX_INTERVAL * 2 + 3].clone();
    let to = items[INDEX_INTERVAL * 2 + 6].clone();
    let range = RecordRange {
        from: Some(from),
        to: Some(to),
    };
    let back = read_with::<Pair>(&KeyValueCodec, handle.as_ref(), &SortOrder::natural(), range)?;
    assert_eq!(back, items[INDEX_INTERVAL * 2 + 3..INDEX_INTERVAL * 2 + 6].to_vec());
    Ok(())
}

#[test]
fn key_only_records_use_byte_order() -> anyhow::Result<()> {
    let (_raw, handle) = mem();
    let items: Vec<Vec<u8>> = vec![b"a".to_vec(), b"ab".to_vec(), vec![0x80]];
    write_with::<Vec<u8>>(&KeyValueCodec, handle.as_ref(), &items)?;
    let range = RecordRange {
        from: Some(b"ab".to_vec()),
        to: None,
    };
    let back = read_with::<Vec<u8>>(&KeyValueCodec, handle.as_ref(), &SortOrder::bytes(), range)?;
    assert_eq!(back, vec![b"ab".to_vec(), vec![0x80]]);
    Ok(())
}

#[test]
fn key_value_bad_magic_is_corrupt() -> anyhow::Result<()> {
    let (raw, handle) = mem();
    write_with::<Pair>(&KeyValueCodec, handle.as_ref(), &pairs(3))?;
    let mut bytes = raw.bytes().unwrap();
    let n = bytes.len();
    bytes[n - 1] ^= 0xFF;
    raw.set_bytes(bytes);

    let mut input = handle.open_read()?;
    let res = RecordCodec::<Pair>::read_count(&KeyValueCodec, input.as_mut());
    assert!(matches!(res, Err(SortedSetError::Corrupt(_))));
    Ok(())
}

#[test]
fn persisted_file_with_key_value_codec() -> anyhow::Result<()> {
    let handle: Arc<dyn StorageHandle> = Arc::new(MemHandle::new());
    let mut set = PersistedFile::<Pair>::new(SortOrder::natural()).with_codec(Arc::new(KeyValueCodec));
    for p in pairs(100) {
        set.add(p)?;
    }
    set.persist(handle)?;
    assert_eq!(set.len()?, 100);

    let items = pairs(100);
    let view = set.sub_set(&items[40], &items[45]);
    assert_eq!(view.to_vec()?, items[40..45].to_vec());
    assert_eq!(set.last()?, items[99]);
    Ok(())
}
