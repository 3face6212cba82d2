use std::collections::HashMap;

use bytes::{Buf, BufMut};

use crate::common::{PageId, HTABLE_DIRECTORY_ARRAY_SIZE, HTABLE_DIRECTORY_MAX_DEPTH, INVALID_PAGE_ID, PAGE_SIZE};

const MAX_DEPTH_OFFSET: usize = 0;
const GLOBAL_DEPTH_OFFSET: usize = 4;
const LOCAL_DEPTHS_OFFSET: usize = 8;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + HTABLE_DIRECTORY_ARRAY_SIZE;

/// View over a directory page of an extendible hash table.
///
/// Layout (little-endian):
/// ```text
/// | max_depth: u32 | global_depth: u32 | local_depths: [u8; 512] | bucket_page_ids: [u32; 512] |
/// 0                4                   8                         520
/// ```
/// Only the first `2^global_depth` slots are meaningful. A bucket with local depth `d`
/// is referenced by exactly `2^(global_depth - d)` slots.
pub struct HashTableDirectoryPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> HashTableDirectoryPage<B> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self { data }
    }

    fn read_u32(&self, offset: usize) -> u32 {
        (&self.data.as_ref()[offset..]).get_u32_le()
    }

    pub fn max_depth(&self) -> u32 {
        self.read_u32(MAX_DEPTH_OFFSET)
    }

    pub fn global_depth(&self) -> u32 {
        self.read_u32(GLOBAL_DEPTH_OFFSET)
    }

    /// Number of slots currently addressed by the global depth.
    pub fn size(&self) -> u32 {
        1 << self.global_depth()
    }

    /// Number of slots the directory may grow to.
    pub fn max_size(&self) -> u32 {
        1 << self.max_depth()
    }

    pub fn global_depth_mask(&self) -> u32 {
        self.size() - 1
    }

    /// Selects a slot from the low `global_depth` bits of the hash.
    pub fn hash_to_bucket_index(&self, hash: u32) -> u32 {
        hash & self.global_depth_mask()
    }

    pub fn local_depth(&self, bucket_idx: u32) -> u32 {
        assert!(bucket_idx < self.max_size());
        self.data.as_ref()[LOCAL_DEPTHS_OFFSET + bucket_idx as usize] as u32
    }

    pub fn local_depth_mask(&self, bucket_idx: u32) -> u32 {
        (1 << self.local_depth(bucket_idx)) - 1
    }

    pub fn bucket_page_id(&self, bucket_idx: u32) -> PageId {
        assert!(bucket_idx < self.max_size());
        PageId::new(self.read_u32(BUCKET_PAGE_IDS_OFFSET + bucket_idx as usize * 4))
    }

    /// Slot that receives half of this slot's bucket when the bucket splits.
    pub fn split_image_index(&self, bucket_idx: u32) -> u32 {
        bucket_idx ^ (1 << self.local_depth(bucket_idx))
    }

    /// Slot whose bucket this slot's bucket would merge with, if any.
    pub fn merge_buddy_index(&self, bucket_idx: u32) -> Option<u32> {
        match self.local_depth(bucket_idx) {
            0 => None,
            depth => Some(bucket_idx ^ (1 << (depth - 1))),
        }
    }

    /// True when every slot's local depth is below the global depth.
    pub fn can_shrink(&self) -> bool {
        let global_depth = self.global_depth();
        global_depth > 0 && (0..self.size()).all(|i| self.local_depth(i) < global_depth)
    }

    /// Asserts the directory topology:
    /// - every local depth is at most the global depth, which is at most the max depth
    /// - slots sharing a bucket agree on its local depth
    /// - a bucket of local depth `d` is referenced by `2^(global_depth - d)` slots
    /// - those slots agree on their low `d` bits
    pub fn verify_integrity(&self) {
        let global_depth = self.global_depth();
        assert!(
            global_depth <= self.max_depth(),
            "global depth {} exceeds max depth {}",
            global_depth,
            self.max_depth()
        );

        // page id -> (slot count, local depth, low bits)
        let mut buckets: HashMap<PageId, (u32, u32, u32)> = HashMap::new();

        for idx in 0..self.size() {
            let page_id = self.bucket_page_id(idx);
            let local_depth = self.local_depth(idx);

            assert_ne!(page_id, INVALID_PAGE_ID, "slot {} has no bucket", idx);
            assert!(
                local_depth <= global_depth,
                "slot {} local depth {} exceeds global depth {}",
                idx,
                local_depth,
                global_depth
            );

            let low_bits = idx & self.local_depth_mask(idx);
            let entry = buckets.entry(page_id).or_insert((0, local_depth, low_bits));
            assert_eq!(entry.1, local_depth, "slots of {} disagree on local depth", page_id);
            assert_eq!(entry.2, low_bits, "slots of {} disagree on low bits", page_id);
            entry.0 += 1;
        }

        for (page_id, (count, local_depth, _)) in buckets {
            assert_eq!(
                count,
                1 << (global_depth - local_depth),
                "{} at local depth {} is referenced by {} slots",
                page_id,
                local_depth,
                count
            );
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HashTableDirectoryPage<B> {
    fn write_u32(&mut self, offset: usize, value: u32) {
        (&mut self.data.as_mut()[offset..]).put_u32_le(value);
    }

    /// Formats an empty directory of global depth 0.
    pub fn init(&mut self, max_depth: u32) {
        assert!(
            max_depth <= HTABLE_DIRECTORY_MAX_DEPTH,
            "directory depth {} exceeds {}",
            max_depth,
            HTABLE_DIRECTORY_MAX_DEPTH
        );

        self.data.as_mut().fill(0);
        self.write_u32(MAX_DEPTH_OFFSET, max_depth);
        self.write_u32(GLOBAL_DEPTH_OFFSET, 0);
        for idx in 0..HTABLE_DIRECTORY_ARRAY_SIZE {
            self.write_u32(BUCKET_PAGE_IDS_OFFSET + idx * 4, INVALID_PAGE_ID.as_u32());
        }
    }

    pub fn set_bucket_page_id(&mut self, bucket_idx: u32, page_id: PageId) {
        assert!(bucket_idx < self.max_size());
        self.write_u32(BUCKET_PAGE_IDS_OFFSET + bucket_idx as usize * 4, page_id.as_u32());
    }

    pub fn set_local_depth(&mut self, bucket_idx: u32, local_depth: u32) {
        assert!(bucket_idx < self.max_size());
        assert!(local_depth <= self.max_depth());
        self.data.as_mut()[LOCAL_DEPTHS_OFFSET + bucket_idx as usize] = local_depth as u8;
    }

    pub fn incr_local_depth(&mut self, bucket_idx: u32) {
        self.set_local_depth(bucket_idx, self.local_depth(bucket_idx) + 1);
    }

    pub fn decr_local_depth(&mut self, bucket_idx: u32) {
        self.set_local_depth(bucket_idx, self.local_depth(bucket_idx) - 1);
    }

    /// Doubles the directory; the new upper half mirrors the lower half.
    pub fn incr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        assert!(
            global_depth < self.max_depth(),
            "directory already at max depth {}",
            global_depth
        );

        let size = self.size();
        for idx in 0..size {
            let page_id = self.bucket_page_id(idx);
            let local_depth = self.local_depth(idx);
            self.set_bucket_page_id(idx + size, page_id);
            self.set_local_depth(idx + size, local_depth);
        }
        self.write_u32(GLOBAL_DEPTH_OFFSET, global_depth + 1);
    }

    /// Halves the directory, clearing the slots that fall out of range.
    pub fn decr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        assert!(global_depth > 0, "directory already at depth 0");

        let half = self.size() / 2;
        for idx in half..self.size() {
            self.set_bucket_page_id(idx, INVALID_PAGE_ID);
            self.set_local_depth(idx, 0);
        }
        self.write_u32(GLOBAL_DEPTH_OFFSET, global_depth - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::zeroed_page;

    #[test]
    fn test_directory_page_init() {
        let mut buf = zeroed_page();
        let mut dir = HashTableDirectoryPage::new(&mut buf[..]);
        dir.init(3);

        assert_eq!(dir.max_depth(), 3);
        assert_eq!(dir.global_depth(), 0);
        assert_eq!(dir.size(), 1);
        assert_eq!(dir.max_size(), 8);
        assert_eq!(dir.bucket_page_id(0), INVALID_PAGE_ID);
        assert_eq!(dir.hash_to_bucket_index(0xFFFF_FFFF), 0);
    }

    #[test]
    fn test_directory_page_grow_mirrors_lower_half() {
        let mut buf = zeroed_page();
        let mut dir = HashTableDirectoryPage::new(&mut buf[..]);
        dir.init(3);
        dir.set_bucket_page_id(0, PageId::new(10));

        dir.incr_global_depth();
        assert_eq!(dir.size(), 2);
        assert_eq!(dir.bucket_page_id(1), PageId::new(10));
        dir.verify_integrity();

        // Split slot 0's bucket into slot 1
        assert_eq!(dir.split_image_index(0), 1);
        dir.set_bucket_page_id(1, PageId::new(11));
        dir.incr_local_depth(0);
        dir.incr_local_depth(1);
        dir.verify_integrity();

        dir.incr_global_depth();
        assert_eq!(dir.size(), 4);
        assert_eq!(dir.bucket_page_id(2), PageId::new(10));
        assert_eq!(dir.bucket_page_id(3), PageId::new(11));
        assert_eq!(dir.local_depth(3), 1);
        assert_eq!(dir.hash_to_bucket_index(0b1110), 0b10);
        assert!(!dir.can_shrink());
        dir.verify_integrity();
    }

    #[test]
    fn test_directory_page_shrink() {
        let mut buf = zeroed_page();
        let mut dir = HashTableDirectoryPage::new(&mut buf[..]);
        dir.init(2);
        dir.set_bucket_page_id(0, PageId::new(4));
        dir.incr_global_depth();
        dir.incr_global_depth();

        assert_eq!(dir.merge_buddy_index(0), None);
        assert!(dir.can_shrink());
        dir.decr_global_depth();
        dir.decr_global_depth();
        assert!(!dir.can_shrink());
        assert_eq!(dir.global_depth(), 0);
        dir.verify_integrity();
    }

    #[test]
    fn test_directory_page_split_then_merge() {
        let mut buf = zeroed_page();
        let mut dir = HashTableDirectoryPage::new(&mut buf[..]);
        dir.init(2);
        dir.set_bucket_page_id(0, PageId::new(3));
        dir.incr_global_depth();

        dir.set_bucket_page_id(1, PageId::new(4));
        dir.incr_local_depth(0);
        dir.incr_local_depth(1);
        assert_eq!(dir.merge_buddy_index(1), Some(0));
        assert!(!dir.can_shrink());

        // Fold slot 1's bucket back into slot 0's
        dir.set_bucket_page_id(1, PageId::new(3));
        dir.decr_local_depth(0);
        dir.decr_local_depth(1);
        assert_eq!(dir.local_depth(1), 0);
        assert!(dir.can_shrink());
        dir.verify_integrity();

        dir.decr_global_depth();
        assert_eq!(dir.bucket_page_id(1), INVALID_PAGE_ID);
        dir.verify_integrity();
    }

    #[test]
    fn test_directory_page_merge_buddy() {
        let mut buf = zeroed_page();
        let mut dir = HashTableDirectoryPage::new(&mut buf[..]);
        dir.init(3);
        dir.set_local_depth(5, 3);
        assert_eq!(dir.merge_buddy_index(5), Some(1));
        dir.set_local_depth(5, 1);
        assert_eq!(dir.merge_buddy_index(5), Some(4));
    }

    #[test]
    #[should_panic]
    fn test_directory_page_grow_past_max_panics() {
        let mut buf = zeroed_page();
        let mut dir = HashTableDirectoryPage::new(&mut buf[..]);
        dir.init(1);
        dir.incr_global_depth();
        dir.incr_global_depth();
    }

    #[test]
    #[should_panic]
    fn test_directory_page_verify_detects_bad_slot_count() {
        let mut buf = zeroed_page();
        let mut dir = HashTableDirectoryPage::new(&mut buf[..]);
        dir.init(2);
        dir.set_bucket_page_id(0, PageId::new(1));
        dir.incr_global_depth();
        // Both slots point at one bucket, yet it claims depth 1
        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);
        dir.verify_integrity();
    }
}
