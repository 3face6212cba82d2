mod codec;
mod extendible_hash_table;
mod hash_function;
mod hash_table_bucket_page;
mod hash_table_directory_page;
mod hash_table_header_page;
mod key_comparator;

pub use codec::{GenericKey, Storable};
pub use extendible_hash_table::DiskExtendibleHashTable;
pub use hash_function::{KeyHasher, XxKeyHasher};
pub use hash_table_bucket_page::{bucket_array_size, HashTableBucketPage};
pub use hash_table_directory_page::HashTableDirectoryPage;
pub use hash_table_header_page::HashTableHeaderPage;
pub use key_comparator::{BytewiseComparator, IntegerComparator, KeyComparator};
