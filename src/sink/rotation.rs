//! Archive naming, rotation and retention for file sinks
//!
//! The active file `demo.jsonl` rotates into `demo.1.jsonl`; older archives
//! shift up to `demo.2.jsonl`, `demo.3.jsonl` and so on. Index 1 is always
//! the most recent archive.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

fn split_name(active: &Path) -> Option<(String, Option<String>)> {
    let stem = active.file_stem()?.to_str()?.to_string();
    let ext = active
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_string());
    Some((stem, ext))
}

/// Path of archive number `index` for the active file
pub fn archive_path(active: &Path, index: usize) -> PathBuf {
    let name = match split_name(active) {
        Some((stem, Some(ext))) => format!("{}.{}.{}", stem, index, ext),
        Some((stem, None)) => format!("{}.{}", stem, index),
        None => format!("{}.{}", active.display(), index),
    };
    active.with_file_name(name)
}

/// Archive number of `candidate`, if it is an archive of `active`
fn archive_index(active: &Path, candidate: &Path) -> Option<usize> {
    let (stem, ext) = split_name(active)?;
    let name = candidate.file_name()?.to_str()?;
    let rest = name.strip_prefix(&stem)?.strip_prefix('.')?;
    let digits = match &ext {
        Some(ext) => rest.strip_suffix(ext.as_str())?.strip_suffix('.')?,
        None => rest,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|i| *i > 0)
}

/// Existing archives of `active`, newest (lowest index) first
pub fn list_archives(active: &Path) -> io::Result<Vec<(usize, PathBuf)>> {
    let dir = match active.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut archives = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(index) = archive_index(active, &path) {
            archives.push((index, path));
        }
    }
    archives.sort_by_key(|(index, _)| *index);
    Ok(archives)
}

/// Move the active file into archive slot 1, keeping at most `keep` archives
///
/// With `keep == 0` the active file is simply removed.
pub fn rotate(active: &Path, keep: usize) -> io::Result<()> {
    if keep == 0 {
        return match fs::remove_file(active) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        };
    }

    let archives = list_archives(active)?;
    for (index, path) in archives.iter().rev() {
        if *index >= keep {
            fs::remove_file(path)?;
        } else {
            fs::rename(path, archive_path(active, index + 1))?;
        }
    }
    if active.exists() {
        fs::rename(active, archive_path(active, 1))?;
    }
    Ok(())
}

/// Delete archives beyond `keep`
///
/// Returns the number of files deleted.
pub fn prune_excess(active: &Path, keep: usize) -> io::Result<usize> {
    let mut deleted = 0;
    for (index, path) in list_archives(active)? {
        if index > keep && fs::remove_file(&path).is_ok() {
            deleted += 1;
        }
    }
    Ok(deleted)
}

/// Delete archives last modified more than `max_age` ago
///
/// Returns the number of files deleted.
pub fn remove_expired(active: &Path, max_age: Duration) -> io::Result<usize> {
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut deleted = 0;
    for (_, path) in list_archives(active)? {
        if let Ok(modified) = fs::metadata(&path).and_then(|m| m.modified()) {
            if modified < cutoff && fs::remove_file(&path).is_ok() {
                deleted += 1;
            }
        }
    }
    Ok(deleted)
}
