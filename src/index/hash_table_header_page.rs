use bytes::{Buf, BufMut};

use crate::common::{PageId, HTABLE_HEADER_ARRAY_SIZE, HTABLE_HEADER_MAX_DEPTH, INVALID_PAGE_ID, PAGE_SIZE};

const DIRECTORY_PAGE_IDS_OFFSET: usize = 0;
const MAX_DEPTH_OFFSET: usize = DIRECTORY_PAGE_IDS_OFFSET + HTABLE_HEADER_ARRAY_SIZE * 4;

/// View over the root page of an extendible hash table.
///
/// Layout (little-endian):
/// ```text
/// | directory_page_ids: [u32; 512] | max_depth: u32 |
/// 0                                2048
/// ```
/// The top `max_depth` bits of a key's hash select the directory slot.
pub struct HashTableHeaderPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> HashTableHeaderPage<B> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self { data }
    }

    pub fn max_depth(&self) -> u32 {
        (&self.data.as_ref()[MAX_DEPTH_OFFSET..]).get_u32_le()
    }

    /// Number of directory slots in use.
    pub fn max_size(&self) -> u32 {
        1 << self.max_depth()
    }

    /// Selects a directory slot from the most significant bits of the hash.
    pub fn hash_to_directory_index(&self, hash: u32) -> u32 {
        match self.max_depth() {
            0 => 0,
            depth => hash >> (32 - depth),
        }
    }

    pub fn directory_page_id(&self, directory_idx: u32) -> PageId {
        assert!(directory_idx < self.max_size());
        let offset = DIRECTORY_PAGE_IDS_OFFSET + directory_idx as usize * 4;
        PageId::new((&self.data.as_ref()[offset..]).get_u32_le())
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HashTableHeaderPage<B> {
    /// Formats a fresh header with no directories.
    pub fn init(&mut self, max_depth: u32) {
        assert!(
            max_depth <= HTABLE_HEADER_MAX_DEPTH,
            "header depth {} exceeds {}",
            max_depth,
            HTABLE_HEADER_MAX_DEPTH
        );

        let data = self.data.as_mut();
        data.fill(0);

        let mut ids = &mut data[DIRECTORY_PAGE_IDS_OFFSET..MAX_DEPTH_OFFSET];
        for _ in 0..HTABLE_HEADER_ARRAY_SIZE {
            ids.put_u32_le(INVALID_PAGE_ID.as_u32());
        }
        (&mut data[MAX_DEPTH_OFFSET..]).put_u32_le(max_depth);
    }

    pub fn set_directory_page_id(&mut self, directory_idx: u32, page_id: PageId) {
        assert!(directory_idx < self.max_size());
        let offset = DIRECTORY_PAGE_IDS_OFFSET + directory_idx as usize * 4;
        (&mut self.data.as_mut()[offset..]).put_u32_le(page_id.as_u32());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::zeroed_page;

    #[test]
    fn test_header_page_init() {
        let mut buf = zeroed_page();
        let mut header = HashTableHeaderPage::new(&mut buf[..]);
        header.init(2);

        assert_eq!(header.max_depth(), 2);
        assert_eq!(header.max_size(), 4);
        for i in 0..4 {
            assert_eq!(header.directory_page_id(i), INVALID_PAGE_ID);
        }

        // Raw layout: max depth sits right after the id array
        assert_eq!(&buf[2048..2052], &[2, 0, 0, 0]);
        assert_eq!(&buf[0..4], &[0xff; 4]);
    }

    #[test]
    fn test_header_page_routes_on_high_bits() {
        let mut buf = zeroed_page();
        let mut header = HashTableHeaderPage::new(&mut buf[..]);
        header.init(2);

        assert_eq!(header.hash_to_directory_index(0x0000_0001), 0);
        assert_eq!(header.hash_to_directory_index(0x4000_0000), 1);
        assert_eq!(header.hash_to_directory_index(0xC000_0000), 3);

        header.init(0);
        assert_eq!(header.hash_to_directory_index(u32::MAX), 0);
    }

    #[test]
    fn test_header_page_set_directory() {
        let mut buf = zeroed_page();
        {
            let mut header = HashTableHeaderPage::new(&mut buf[..]);
            header.init(1);
            header.set_directory_page_id(1, PageId::new(9));
        }

        let header = HashTableHeaderPage::new(&buf[..]);
        assert_eq!(header.directory_page_id(0), INVALID_PAGE_ID);
        assert_eq!(header.directory_page_id(1), PageId::new(9));
    }
}
