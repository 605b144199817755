//! `pokedex cache-stats` and `pokedex clear-cache`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use pokedex_core::DiskCache;

fn open(cache_dir: Option<PathBuf>) -> DiskCache {
    DiskCache::new(cache_dir.unwrap_or_else(DiskCache::default_dir))
}

pub fn stats(cache_dir: Option<PathBuf>) -> Result<()> {
    let cache = open(cache_dir);
    let stats = cache.stats();

    println!("Cache: {}", cache.dir().display());
    println!("  Entries: {}", stats.entries);
    println!("  Size:    {}", format_bytes(stats.bytes));
    Ok(())
}

pub fn clear(cache_dir: Option<PathBuf>) -> Result<()> {
    let cache = open(cache_dir);
    let before = cache.stats();

    cache
        .clear()
        .with_context(|| format!("Failed to clear cache at {}", cache.dir().display()))?;

    tracing::info!(
        dir = %cache.dir().display(),
        entries = before.entries,
        "Cleared HTTP cache"
    );
    println!(
        "Removed {} cached responses ({})",
        before.entries,
        format_bytes(before.bytes)
    );
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}
