use std::fmt;

use bytes::{Buf, BufMut};

use crate::common::{PageId, RecordId, SlotId};

/// Fixed-width little-endian encoding for keys and values stored in index pages.
pub trait Storable: Copy + Send + Sync + fmt::Debug + 'static {
    /// Encoded width in bytes
    const SIZE: usize;

    /// Writes `SIZE` bytes to the front of `buf`.
    fn encode(&self, buf: &mut [u8]);

    /// Reads a value from the first `SIZE` bytes of `buf`.
    fn decode(buf: &[u8]) -> Self;

    /// Encodes into a freshly allocated buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        self.encode(&mut buf);
        buf
    }
}

impl Storable for i32 {
    const SIZE: usize = 4;

    fn encode(&self, mut buf: &mut [u8]) {
        buf.put_i32_le(*self);
    }

    fn decode(mut buf: &[u8]) -> Self {
        buf.get_i32_le()
    }
}

impl Storable for RecordId {
    const SIZE: usize = 8;

    fn encode(&self, mut buf: &mut [u8]) {
        buf.put_u32_le(self.page_id.as_u32());
        buf.put_u32_le(self.slot_id.as_u32());
    }

    fn decode(mut buf: &[u8]) -> Self {
        let page_id = PageId::new(buf.get_u32_le());
        let slot_id = SlotId::new(buf.get_u32_le());
        RecordId::new(page_id, slot_id)
    }
}

/// Opaque fixed-width key, compared bytewise.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    /// Builds a key from an integer, little-endian, truncated or zero-padded to `N` bytes.
    pub fn from_integer(value: i64) -> Self {
        Self::from_bytes(&value.to_le_bytes())
    }

    /// Builds a key from raw bytes, truncated or zero-padded to `N` bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = [0u8; N];
        let n = bytes.len().min(N);
        data[..n].copy_from_slice(&bytes[..n]);
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self { data: [0u8; N] }
    }
}

impl<const N: usize> fmt::Debug for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericKey<{}>(", N)?;
        for b in &self.data {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

impl<const N: usize> Storable for GenericKey<N> {
    const SIZE: usize = N;

    fn encode(&self, mut buf: &mut [u8]) {
        buf.put_slice(&self.data);
    }

    fn decode(mut buf: &[u8]) -> Self {
        let mut data = [0u8; N];
        buf.copy_to_slice(&mut data);
        Self { data }
    }
}
