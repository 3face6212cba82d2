use std::cmp::Ordering;
use std::marker::PhantomData;

use bytes::{Buf, BufMut};

use crate::common::PAGE_SIZE;

use super::{KeyComparator, Storable};

const SIZE_OFFSET: usize = 0;
const MAX_SIZE_OFFSET: usize = 4;
const ENTRIES_OFFSET: usize = 8;

/// Number of `(K, V)` entries that fit in one bucket page.
pub const fn bucket_array_size<K: Storable, V: Storable>() -> usize {
    (PAGE_SIZE - ENTRIES_OFFSET) / (K::SIZE + V::SIZE)
}

/// View over a bucket page: an unordered flat array of encoded `(key, value)` entries.
///
/// ```text
/// | size: u32 | max_size: u32 | key 0 | value 0 | key 1 | value 1 | ...
/// ```
pub struct HashTableBucketPage<B, K, V> {
    data: B,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<B: AsRef<[u8]>, K: Storable, V: Storable> HashTableBucketPage<B, K, V> {
    const ENTRY_SIZE: usize = K::SIZE + V::SIZE;

    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self {
            data,
            _marker: PhantomData,
        }
    }

    pub fn size(&self) -> u32 {
        (&self.data.as_ref()[SIZE_OFFSET..]).get_u32_le()
    }

    pub fn max_size(&self) -> u32 {
        (&self.data.as_ref()[MAX_SIZE_OFFSET..]).get_u32_le()
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.max_size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn entry_offset(idx: u32) -> usize {
        ENTRIES_OFFSET + idx as usize * Self::ENTRY_SIZE
    }

    fn key_bytes_at(&self, idx: u32) -> &[u8] {
        let offset = Self::entry_offset(idx);
        &self.data.as_ref()[offset..offset + K::SIZE]
    }

    pub fn key_at(&self, idx: u32) -> K {
        assert!(idx < self.size());
        K::decode(self.key_bytes_at(idx))
    }

    pub fn value_at(&self, idx: u32) -> V {
        assert!(idx < self.size());
        V::decode(&self.data.as_ref()[Self::entry_offset(idx) + K::SIZE..])
    }

    pub fn entry_at(&self, idx: u32) -> (K, V) {
        (self.key_at(idx), self.value_at(idx))
    }

    /// Copies out every entry, in slot order.
    pub fn entries(&self) -> Vec<(K, V)> {
        (0..self.size()).map(|i| self.entry_at(i)).collect()
    }

    fn position(&self, key: &[u8], cmp: &dyn KeyComparator) -> Option<u32> {
        (0..self.size()).find(|&i| cmp.compare(self.key_bytes_at(i), key) == Ordering::Equal)
    }

    pub fn lookup<C: KeyComparator>(&self, key: &K, cmp: &C) -> Option<V> {
        self.position(&key.to_bytes(), cmp).map(|i| self.value_at(i))
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>, K: Storable, V: Storable> HashTableBucketPage<B, K, V> {
    /// Formats an empty bucket holding at most `max_size` entries.
    pub fn init(&mut self, max_size: u32) {
        assert!(
            max_size as usize <= bucket_array_size::<K, V>(),
            "bucket size {} exceeds page capacity {}",
            max_size,
            bucket_array_size::<K, V>()
        );

        let data = self.data.as_mut();
        data.fill(0);
        (&mut data[MAX_SIZE_OFFSET..]).put_u32_le(max_size);
    }

    fn set_size(&mut self, size: u32) {
        (&mut self.data.as_mut()[SIZE_OFFSET..]).put_u32_le(size);
    }

    /// Appends an entry. Returns false if the bucket is full or already holds the key.
    pub fn insert<C: KeyComparator>(&mut self, key: &K, value: &V, cmp: &C) -> bool {
        let key_bytes = key.to_bytes();
        if self.is_full() || self.position(&key_bytes, cmp).is_some() {
            return false;
        }

        let size = self.size();
        let offset = Self::entry_offset(size);
        let slot = &mut self.data.as_mut()[offset..offset + Self::ENTRY_SIZE];
        slot[..K::SIZE].copy_from_slice(&key_bytes);
        value.encode(&mut slot[K::SIZE..]);

        self.set_size(size + 1);
        true
    }

    /// Removes the entry for `key`. Returns false if the key isn't present.
    pub fn remove<C: KeyComparator>(&mut self, key: &K, cmp: &C) -> bool {
        match self.position(&key.to_bytes(), cmp) {
            Some(idx) => {
                self.remove_at(idx);
                true
            }
            None => false,
        }
    }

    /// Removes the entry in slot `idx`, shifting later entries down.
    pub fn remove_at(&mut self, idx: u32) {
        let size = self.size();
        assert!(idx < size);

        let start = Self::entry_offset(idx);
        let end = Self::entry_offset(size);
        self.data
            .as_mut()
            .copy_within(start + Self::ENTRY_SIZE..end, start);
        self.set_size(size - 1);
    }

    /// Drops every entry, keeping `max_size`.
    pub fn clear(&mut self) {
        self.set_size(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{zeroed_page, PageId, RecordId, SlotId};
    use crate::index::{BytewiseComparator, GenericKey, IntegerComparator};

    #[test]
    fn test_bucket_capacity() {
        assert_eq!(bucket_array_size::<i32, i32>(), 511);
        assert_eq!(bucket_array_size::<GenericKey<8>, RecordId>(), 255);
        assert_eq!(bucket_array_size::<GenericKey<64>, RecordId>(), 56);
    }

    #[test]
    fn test_bucket_insert_lookup_remove() {
        let mut buf = zeroed_page();
        let mut bucket = HashTableBucketPage::<_, i32, i32>::new(&mut buf[..]);
        bucket.init(3);
        let cmp = IntegerComparator;

        assert!(bucket.is_empty());
        assert!(bucket.insert(&1, &10, &cmp));
        assert!(bucket.insert(&2, &20, &cmp));
        assert!(!bucket.insert(&1, &11, &cmp));
        assert!(bucket.insert(&3, &30, &cmp));
        assert!(bucket.is_full());
        assert!(!bucket.insert(&4, &40, &cmp));

        assert_eq!(bucket.lookup(&2, &cmp), Some(20));
        assert_eq!(bucket.lookup(&4, &cmp), None);

        assert!(bucket.remove(&1, &cmp));
        assert!(!bucket.remove(&1, &cmp));
        assert_eq!(bucket.size(), 2);
        assert_eq!(bucket.entries(), vec![(2, 20), (3, 30)]);
    }

    #[test]
    fn test_bucket_layout() {
        let mut buf = zeroed_page();
        {
            let mut bucket = HashTableBucketPage::<_, i32, i32>::new(&mut buf[..]);
            bucket.init(4);
            bucket.insert(&-1, &7, &IntegerComparator);
        }

        assert_eq!(&buf[0..4], &[1, 0, 0, 0]);
        assert_eq!(&buf[4..8], &[4, 0, 0, 0]);
        assert_eq!(&buf[8..12], &[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(&buf[12..16], &[7, 0, 0, 0]);
    }

    #[test]
    fn test_bucket_generic_key_record_id() {
        let mut buf = zeroed_page();
        let mut bucket = HashTableBucketPage::<_, GenericKey<16>, RecordId>::new(&mut buf[..]);
        bucket.init(bucket_array_size::<GenericKey<16>, RecordId>() as u32);
        let cmp = BytewiseComparator;

        for i in 0..10 {
            let rid = RecordId::new(PageId::new(i as u32), SlotId::new(i as u32 * 2));
            assert!(bucket.insert(&GenericKey::from_integer(i), &rid, &cmp));
        }

        let rid = bucket.lookup(&GenericKey::from_integer(7), &cmp).unwrap();
        assert_eq!(rid.page_id, PageId::new(7));
        assert_eq!(rid.slot_id, SlotId::new(14));

        bucket.clear();
        assert!(bucket.is_empty());
        assert_eq!(bucket.lookup(&GenericKey::from_integer(7), &cmp), None);
    }

    #[test]
    #[should_panic]
    fn test_bucket_init_over_capacity_panics() {
        let mut buf = zeroed_page();
        let mut bucket = HashTableBucketPage::<_, i32, i32>::new(&mut buf[..]);
        bucket.init(512);
    }
}
