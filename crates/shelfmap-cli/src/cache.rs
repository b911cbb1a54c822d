use std::path::Path;
use std::sync::Arc;

use shelfmap_cache::{FileBackend, LocalCache, SystemClock};

/// Remove entries from the on-disk cache.
///
/// # Errors
///
/// Returns an error if the cache directory cannot be opened or an entry
/// cannot be removed.
pub(crate) async fn run_cache_purge(dir: &Path, prefix: Option<&str>) -> anyhow::Result<()> {
    let removed = purge(dir, prefix).await?;
    match prefix {
        Some(prefix) => println!("removed {removed} cache entr(ies) under '{prefix}'"),
        None => println!("removed {removed} cache entr(ies)"),
    }
    Ok(())
}

async fn purge(dir: &Path, prefix: Option<&str>) -> anyhow::Result<usize> {
    let backend = FileBackend::open(dir).await?;
    let cache = LocalCache::new(Arc::new(backend), Arc::new(SystemClock));
    // The empty prefix matches every key.
    Ok(cache.invalidate_by_prefix(prefix.unwrap_or("")).await?)
}
