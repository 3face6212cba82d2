use std::sync::Arc;

use env_logger::Env;
use log::{error, info};

use strata::buffer::BufferPoolManager;
use strata::common::StorageConfig;
use strata::index::{BytewiseComparator, DiskExtendibleHashTable, GenericKey, XxKeyHasher};
use strata::storage::disk::{DiskManager, FileDiskManager};
use strata::{PageId, RecordId, Result, SlotId};

const DB_PATH: &str = "demo.db";
const NUM_KEYS: i64 = 2000;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        error!("demo failed: {}", e);
        std::process::exit(1);
    }

    std::fs::remove_file(DB_PATH).ok();
}

fn run() -> Result<()> {
    let config = StorageConfig::from_env();
    info!("starting with {:?}", config);

    let disk_manager = Arc::new(FileDiskManager::new(DB_PATH)?);
    let bpm = Arc::new(BufferPoolManager::with_config(&config, disk_manager.clone())?);

    let index = DiskExtendibleHashTable::<GenericKey<8>, RecordId, _, _>::with_config(
        "demo_index",
        Arc::clone(&bpm),
        BytewiseComparator,
        XxKeyHasher,
        &config,
    )?;
    info!("created index with header {}", index.header_page_id());

    let rid_for = |i: i64| RecordId::new(PageId::new(i as u32 / 16), SlotId::new(i as u32 % 16));

    for i in 0..NUM_KEYS {
        index.insert(&GenericKey::from_integer(i), &rid_for(i))?;
    }
    info!("inserted {} keys", NUM_KEYS);

    let mut found = 0;
    for i in 0..NUM_KEYS {
        if index.get_value(&GenericKey::from_integer(i))? == Some(rid_for(i)) {
            found += 1;
        }
    }
    info!("found {}/{} keys", found, NUM_KEYS);

    let mut removed = 0;
    for i in (0..NUM_KEYS).step_by(2) {
        if index.remove(&GenericKey::from_integer(i))? {
            removed += 1;
        }
    }
    info!("removed {} keys", removed);

    index.verify_integrity()?;
    index.print_hash_table()?;

    bpm.flush_all_pages();

    info!(
        "pool: {} frames, {} free, {} evictable; disk: {} pages, {} reads, {} writes",
        bpm.pool_size(),
        bpm.free_frame_count(),
        bpm.evictable_count(),
        bpm.disk_manager().num_pages(),
        disk_manager.get_num_reads(),
        disk_manager.get_num_writes()
    );

    Ok(())
}
