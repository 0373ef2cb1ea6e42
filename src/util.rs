use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

/// Write `content` to `path` atomically.
///
/// Writes a temp file in the same directory, then renames it over the target, so a
/// reader never observes a partial file. Creates the parent directory if needed.
pub fn atomic_write_str(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Modification time and size of a regular file, used to spot rewrites by
/// another process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    modified: SystemTime,
    len: u64,
}

/// `None` when `path` is missing or not a regular file.
pub fn file_stamp(path: &Path) -> Option<FileStamp> {
    let meta = std::fs::metadata(path).ok().filter(|m| m.is_file())?;
    Some(FileStamp {
        modified: meta.modified().ok()?,
        len: meta.len(),
    })
}

/// First `max` characters of `text` (char-boundary safe).
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Coarse time-of-day label for an hour (0-23).
///
/// Example: 7 → "early morning", 13 → "midday"
pub fn time_desc(hour: u32) -> &'static str {
    match hour % 24 {
        0..=5 => "late night",
        6..=8 => "early morning",
        9..=11 => "morning",
        12..=13 => "midday",
        14..=17 => "afternoon",
        18..=21 => "evening",
        _ => "late night",
    }
}
