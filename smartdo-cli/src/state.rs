use anyhow::{Context, Result};
use chrono::Utc;
use smartdo_ai::{RateLimiter, WindowSnapshot};
use smartdo_core::{CacheEntry, ResultCache};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub fn smartdo_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SMARTDO_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".smartdo"))
}

pub fn ensure_smartdo_home() -> Result<PathBuf> {
    let dir = smartdo_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn store_path() -> Result<PathBuf> {
    Ok(ensure_smartdo_home()?.join("store.json"))
}

pub fn cache_path() -> Result<PathBuf> {
    Ok(ensure_smartdo_home()?.join("cache.json"))
}

pub fn limits_path() -> Result<PathBuf> {
    Ok(ensure_smartdo_home()?.join("limits.json"))
}

/// Load live entries from a cache file into `cache`. A missing or unreadable
/// file just means a cold cache.
pub fn load_cache(cache: &ResultCache, path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let entries: Vec<CacheEntry> = match serde_json::from_str(&s) {
        Ok(e) => e,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable cache file");
            return Ok(0);
        }
    };
    let restored = cache.restore_at(entries, Utc::now());
    debug!(restored, "cache restored");
    Ok(restored)
}

pub fn save_cache(cache: &ResultCache, path: &Path) -> Result<()> {
    let now = Utc::now();
    let purged = cache.purge_expired_at(now);
    let entries = cache.snapshot_at(now);
    let s = serde_json::to_string_pretty(&entries)?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    debug!(entries = entries.len(), purged, "cache saved");
    Ok(())
}

/// Restore per-caller rate-limit windows so the limit holds across runs.
/// Like the cache, a missing or garbled file starts every window fresh.
pub fn load_limits(limiter: &RateLimiter, path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let windows: Vec<WindowSnapshot> = match serde_json::from_str(&s) {
        Ok(w) => w,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable limits file");
            return Ok(0);
        }
    };
    let restored = limiter.restore_at(windows, Utc::now());
    debug!(restored, "rate limits restored");
    Ok(restored)
}

pub fn save_limits(limiter: &RateLimiter, path: &Path) -> Result<()> {
    let windows = limiter.snapshot_at(Utc::now());
    let s = serde_json::to_string_pretty(&windows)?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    debug!(windows = windows.len(), "rate limits saved");
    Ok(())
}
