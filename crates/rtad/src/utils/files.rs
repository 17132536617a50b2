//! File and folder handlers.
//!
//! Every operation reports through an [`ErrorCode`]; I/O errors are logged
//! with the offending path and collapsed to `FAILED`.
//!
//! # Async Safety
//!
//! All functions here are blocking and are run via `spawn_blocking`.

use std::fs::{self, DirBuilder, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use rta_core::{ChunkStatus, ErrorCode, BACKUP_SUFFIX};

/// Permission bits for folders created by [`folder_create`].
pub const FOLDER_MODE: u32 = 0o775;

fn backup_path(path: &Path, name: &str) -> PathBuf {
    path.join(format!("{name}{BACKUP_SUFFIX}"))
}

fn status(op: &'static str, target: &Path, result: io::Result<()>) -> ErrorCode {
    match result {
        Ok(()) => {
            debug!(op, path = %target.display(), "File operation complete");
            ErrorCode::Success
        }
        Err(e) => {
            warn!(op, path = %target.display(), error = %e, "File operation failed");
            ErrorCode::Failed
        }
    }
}

fn presence(target: &Path) -> ErrorCode {
    if fs::metadata(target).is_ok() {
        ErrorCode::Success
    } else {
        ErrorCode::Failed
    }
}

// ============================================================================
// Files
// ============================================================================

/// Copies `path/name` to `path/name_origin`.
pub fn file_backup(path: &Path, name: &str) -> ErrorCode {
    let source = path.join(name);
    let result = fs::copy(&source, backup_path(path, name)).map(|_| ());
    status("file_backup", &source, result)
}

/// Copies the backup over `path/name` and removes the backup.
pub fn file_restore(path: &Path, name: &str) -> ErrorCode {
    let backup = backup_path(path, name);
    let result = fs::copy(&backup, path.join(name)).and_then(|_| fs::remove_file(&backup));
    status("file_restore", &backup, result)
}

/// Creates or truncates `path/name` and writes `content`.
pub fn file_update(path: &Path, name: &str, content: &str) -> ErrorCode {
    let target = path.join(name);
    let result = fs::write(&target, content);
    status("file_update", &target, result)
}

pub fn file_exists(path: &Path, name: &str) -> ErrorCode {
    presence(&path.join(name))
}

pub fn file_delete(path: &Path, name: &str) -> ErrorCode {
    let target = path.join(name);
    let result = fs::remove_file(&target);
    status("file_delete", &target, result)
}

// ============================================================================
// Folders
// ============================================================================

pub fn folder_exists(path: &Path) -> ErrorCode {
    presence(path)
}

/// Creates a single folder level; the parent must already exist.
pub fn folder_create(path: &Path) -> ErrorCode {
    let result = DirBuilder::new().mode(FOLDER_MODE).create(path);
    status("folder_create", path, result)
}

/// Removes `path` and everything beneath it.
pub fn folder_delete(path: &Path) -> ErrorCode {
    let result = fs::remove_dir_all(path);
    status("folder_delete", path, result)
}

// ============================================================================
// Chunked Content
// ============================================================================

/// Longest UTF-8 encoded character, in bytes.
const MAX_UTF8_WIDTH: u64 = 4;

/// Reads one chunk of `path/name` starting at `offset`.
///
/// `max_size <= 0` reads to the end of the file. A chunk that fills
/// `max_size` exactly reports [`ChunkStatus::MoreAt`] with the next offset,
/// so a file whose length is a multiple of `max_size` ends with an empty
/// [`ChunkStatus::Done`] chunk.
///
/// Chunks travel as JSON strings, so a chunk always ends on a character
/// boundary: a multibyte character cut by `max_size` is left for the next
/// chunk, or completed with up to three extra bytes when it is the only
/// thing in the chunk. The reported offset counts the bytes actually
/// consumed. Bytes that are not UTF-8 at all are replaced with U+FFFD.
pub fn read_chunk(path: &Path, name: &str, offset: i64, max_size: i64) -> (String, ChunkStatus) {
    let target = path.join(name);
    match read_chunk_text(&target, offset, max_size) {
        Ok((text, status)) => {
            debug!(path = %target.display(), offset, read = text.len(), status = ?status, "Chunk read");
            (text, status)
        }
        Err(e) => {
            warn!(path = %target.display(), offset, error = %e, "Chunk read failed");
            (String::new(), ChunkStatus::from(ErrorCode::Failed))
        }
    }
}

fn read_chunk_text(target: &Path, offset: i64, max_size: i64) -> io::Result<(String, ChunkStatus)> {
    let mut file = File::open(target)?;
    let len = file.metadata()?.len();

    let start = u64::try_from(offset)
        .ok()
        .filter(|&start| start <= len)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("offset {offset} outside file of {len} bytes"),
            )
        })?;

    let remaining = len - start;
    let limit = match u64::try_from(max_size) {
        Ok(max) if max > 0 => remaining.min(max),
        _ => remaining,
    };

    file.seek(SeekFrom::Start(start))?;
    let mut bytes = Vec::with_capacity(usize::try_from(limit).unwrap_or(0));
    file.by_ref().take(limit).read_to_end(&mut bytes)?;
    let read = bytes.len() as u64;

    if start + read < len {
        align_to_char_boundary(&mut file, &mut bytes)?;
    }
    let consumed = bytes.len() as u64;

    let status = if max_size > 0 && read > 0 && read == max_size as u64 {
        ChunkStatus::MoreAt(start + consumed)
    } else {
        ChunkStatus::Done
    };

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    Ok((text, status))
}

/// Drops a multibyte character cut off at the end of `bytes`, or reads
/// the rest of it from `file` when nothing else would be left.
fn align_to_char_boundary(file: &mut File, bytes: &mut Vec<u8>) -> io::Result<()> {
    let valid = match std::str::from_utf8(bytes) {
        Ok(_) => return Ok(()),
        // Invalid bytes, not a truncated sequence
        Err(e) if e.error_len().is_some() => return Ok(()),
        Err(e) => e.valid_up_to(),
    };

    if valid > 0 {
        bytes.truncate(valid);
        return Ok(());
    }

    let mut tail = file.by_ref().take(MAX_UTF8_WIDTH - 1).bytes();
    while std::str::from_utf8(bytes).is_err() {
        match tail.next() {
            Some(byte) => bytes.push(byte?),
            None => break,
        }
    }
    Ok(())
}
