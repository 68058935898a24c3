//! On-disk layout of the content cache.
//!
//! ```text
//! <root>/<digest(key)>/meta.json              {"key": ..., "content_length": ...}
//! <root>/<digest(key)>/<start, 20 digits>.span  bytes [start, start + file length)
//! ```
//!
//! A span's length is its file's length and its last-access stamp is its
//! modification time, in nanoseconds since the Unix epoch. All functions
//! here are blocking and run on the blocking pool.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mediadl_core::CacheKey;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const META_FILE: &str = "meta.json";
const SPAN_EXT: &str = "span";

/// Per-key metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMeta {
    pub key: String,
    #[serde(default)]
    pub content_length: Option<u64>,
}

/// A span found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedSpan {
    pub start: u64,
    pub len: u64,
    /// Last-access stamp read back from the modification time.
    pub stamp: u64,
}

/// A key directory found on disk.
#[derive(Debug, Clone)]
pub struct ScannedKey {
    pub key: CacheKey,
    pub content_length: Option<u64>,
    pub spans: Vec<ScannedSpan>,
}

pub fn key_dir(root: &Path, key: &CacheKey) -> PathBuf {
    root.join(key.digest())
}

pub fn span_path(dir: &Path, start: u64) -> PathBuf {
    dir.join(format!("{start:020}.{SPAN_EXT}"))
}

/// Write `meta.json` atomically, creating the key directory if needed.
pub fn write_meta(dir: &Path, meta: &KeyMeta) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let json = serde_json::to_vec(meta).map_err(io::Error::other)?;
    let tmp = dir.join(format!("{META_FILE}.tmp"));
    fs::write(&tmp, json)?;
    fs::rename(tmp, dir.join(META_FILE))
}

pub fn has_meta(dir: &Path) -> bool {
    dir.join(META_FILE).is_file()
}

fn read_meta(dir: &Path) -> io::Result<KeyMeta> {
    let bytes = fs::read(dir.join(META_FILE))?;
    serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Create a new span file holding `data`.
pub fn create_span(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(data)?;
    file.sync_data()
}

/// Append `data` to an existing span file.
pub fn append_span(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(data)?;
    file.sync_data()
}

/// Append the whole of `src` to `dst`.
pub fn append_file(dst: &Path, src: &Path) -> io::Result<u64> {
    let mut from = File::open(src)?;
    let mut to = OpenOptions::new().append(true).open(dst)?;
    let copied = io::copy(&mut from, &mut to)?;
    to.sync_data()?;
    Ok(copied)
}

/// Cut a span file down to `len` bytes.
pub fn truncate_span(path: &Path, len: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    file.sync_data()
}

/// Store a span's last-access stamp as its modification time.
pub fn stamp_span(path: &Path, stamp: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_modified(UNIX_EPOCH + Duration::from_nanos(stamp))
}

fn stamp_of(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

/// Read up to `len` bytes at `offset` within a span file.
pub fn read_span(path: &Path, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Remove a file, treating "already gone" as success.
pub fn remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Remove a key directory, treating "already gone" as success.
pub fn remove_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn parse_span_name(path: &Path) -> Option<u64> {
    if path.extension()?.to_str()? != SPAN_EXT {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Scan the cache root, repairing what a crash may have left behind.
///
/// Directories without readable metadata are deleted, as are zero-length
/// and stray files. Overlapping spans of one key are resolved by truncating
/// the earlier span or deleting a fully covered later one.
pub fn scan(root: &Path) -> io::Result<Vec<ScannedKey>> {
    fs::create_dir_all(root)?;
    let mut keys = Vec::new();

    for dir_entry in fs::read_dir(root)? {
        let dir = dir_entry?.path();
        if !dir.is_dir() {
            warn!(path = %dir.display(), "Removing stray file in cache root");
            remove_file(&dir)?;
            continue;
        }
        let meta = match read_meta(&dir) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Removing cache entry without metadata");
                remove_dir(&dir)?;
                continue;
            }
        };
        let key = CacheKey::new(meta.key);
        if key_dir(root, &key) != dir {
            warn!(path = %dir.display(), "Removing cache entry stored under the wrong digest");
            remove_dir(&dir)?;
            continue;
        }

        let mut spans = Vec::new();
        for file_entry in fs::read_dir(&dir)? {
            let file_entry = file_entry?;
            let path = file_entry.path();
            let Some(start) = parse_span_name(&path) else {
                if path.file_name().and_then(|n| n.to_str()) != Some(META_FILE) {
                    remove_file(&path)?;
                }
                continue;
            };
            let metadata = file_entry.metadata()?;
            if metadata.len() == 0 {
                remove_file(&path)?;
                continue;
            }
            spans.push(ScannedSpan {
                start,
                len: metadata.len(),
                stamp: metadata.modified().map_or(0, stamp_of),
            });
        }
        spans.sort_by_key(|span| span.start);
        let spans = resolve_overlaps(&dir, spans)?;

        debug!(key = %key, spans = spans.len(), "Scanned cache entry");
        keys.push(ScannedKey {
            key,
            content_length: meta.content_length,
            spans,
        });
    }
    Ok(keys)
}

fn resolve_overlaps(dir: &Path, sorted: Vec<ScannedSpan>) -> io::Result<Vec<ScannedSpan>> {
    let mut kept: Vec<ScannedSpan> = Vec::with_capacity(sorted.len());
    for span in sorted {
        let Some(prev) = kept.last_mut() else {
            kept.push(span);
            continue;
        };
        let prev_end = prev.start + prev.len;
        if span.start >= prev_end {
            kept.push(span);
        } else if span.start + span.len <= prev_end {
            remove_file(&span_path(dir, span.start))?;
        } else {
            prev.len = span.start - prev.start;
            truncate_span(&span_path(dir, prev.start), prev.len)?;
            kept.push(span);
        }
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_span_names_sort_numerically() {
        let dir = Path::new("/c");
        assert!(span_path(dir, 9) < span_path(dir, 10));
        assert_eq!(parse_span_name(&span_path(dir, 42)), Some(42));
        assert_eq!(parse_span_name(Path::new("/c/meta.json")), None);
    }

    #[test]
    fn test_scan_repairs_overlaps_and_junk() {
        let root = TempDir::new().unwrap();
        let key = CacheKey::new("k");
        let dir = key_dir(root.path(), &key);
        write_meta(
            &dir,
            &KeyMeta {
                key: "k".into(),
                content_length: Some(100),
            },
        )
        .unwrap();
        create_span(&span_path(&dir, 0), &[1; 20]).unwrap();
        create_span(&span_path(&dir, 10), &[2; 20]).unwrap();
        create_span(&span_path(&dir, 12), &[3; 5]).unwrap();
        create_span(&span_path(&dir, 50), &[]).unwrap();
        fs::write(dir.join("junk.tmp"), b"x").unwrap();
        fs::create_dir_all(root.path().join("orphan")).unwrap();

        let scanned = scan(root.path()).unwrap();
        assert_eq!(scanned.len(), 1);
        let spans: Vec<(u64, u64)> = scanned[0].spans.iter().map(|s| (s.start, s.len)).collect();
        assert_eq!(spans, vec![(0, 10), (10, 20)]);
        assert_eq!(scanned[0].content_length, Some(100));
        assert_eq!(fs::metadata(span_path(&dir, 0)).unwrap().len(), 10);
        assert!(!span_path(&dir, 12).exists());
        assert!(!dir.join("junk.tmp").exists());
        assert!(!root.path().join("orphan").exists());
    }

    #[test]
    fn test_append_and_read() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("0.span");
        create_span(&path, b"hello ").unwrap();
        append_span(&path, b"world").unwrap();
        assert_eq!(read_span(&path, 6, 100).unwrap(), b"world");
        truncate_span(&path, 5).unwrap();
        assert_eq!(read_span(&path, 0, 100).unwrap(), b"hello");
    }

    #[test]
    fn test_stamp_is_read_back_by_scan() {
        let root = TempDir::new().unwrap();
        let key = CacheKey::new("k");
        let dir = key_dir(root.path(), &key);
        write_meta(
            &dir,
            &KeyMeta {
                key: "k".into(),
                content_length: None,
            },
        )
        .unwrap();
        create_span(&span_path(&dir, 0), &[1; 4]).unwrap();
        let stamp = 1_700_000_000_000_000_000;
        stamp_span(&span_path(&dir, 0), stamp).unwrap();

        let scanned = scan(root.path()).unwrap();
        assert_eq!(scanned[0].spans[0].stamp, stamp);
    }
}
