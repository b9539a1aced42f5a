use byteorder::{BigEndian, ByteOrder};

use crate::error::{Result, SortedSetError};

/// Element that can be written to and read back from a persisted file.
///
/// `encode` appends the payload only; framing, checksums and the null
/// marker are the codec's business. A type with a representable "absent"
/// value (see the `Option<T>` impl) reports it through [`Record::is_absent`]
/// and rebuilds it with [`Record::absent`], so codecs can store it as a
/// reserved marker instead of a payload.
pub trait Record: Clone + Send + Sync + 'static {
    fn encode(&self, out: &mut Vec<u8>);

    fn decode(bytes: &[u8]) -> Result<Self>;

    fn is_absent(&self) -> bool {
        false
    }

    /// The absent value, if this type has one.
    fn absent() -> Option<Self> {
        None
    }
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        SortedSetError::Corrupt(format!(
            "{what} payload must be {N} bytes, got {}",
            bytes.len()
        ))
    })
}

impl Record for Vec<u8> {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

impl Record for String {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| SortedSetError::Corrupt(format!("string payload is not utf-8: {e}")))
    }
}

// Big-endian so the encoded bytes of non-negative integers sort like the
// integers themselves.
impl Record for u64 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(BigEndian::read_u64(&fixed::<8>(bytes, "u64")?))
    }
}

impl Record for u32 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(BigEndian::read_u32(&fixed::<4>(bytes, "u32")?))
    }
}

impl Record for i64 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(BigEndian::read_i64(&fixed::<8>(bytes, "i64")?))
    }
}

impl<T: Record> Record for Option<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        if let Some(v) = self {
            v.encode(out);
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        T::decode(bytes).map(Some)
    }

    fn is_absent(&self) -> bool {
        self.is_none()
    }

    fn absent() -> Option<Self> {
        Some(None)
    }
}

/// Pairs are stored as `[a_len: u32 BE][a][b]`.
impl<A: Record, B: Record> Record for (A, B) {
    fn encode(&self, out: &mut Vec<u8>) {
        let len_at = out.len();
        out.extend_from_slice(&[0; 4]);
        self.0.encode(out);
        let a_len = (out.len() - len_at - 4) as u32;
        BigEndian::write_u32(&mut out[len_at..len_at + 4], a_len);
        self.1.encode(out);
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(SortedSetError::Corrupt("pair payload too short".into()));
        }
        let a_len = BigEndian::read_u32(&bytes[..4]) as usize;
        let rest = &bytes[4..];
        if a_len > rest.len() {
            return Err(SortedSetError::Corrupt(format!(
                "pair first half claims {a_len} bytes, {} available",
                rest.len()
            )));
        }
        Ok((A::decode(&rest[..a_len])?, B::decode(&rest[a_len..])?))
    }
}
