//! Archive naming, packing and retention.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{BackupError, Result};

/// Suffix of every archive.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Makes an application name safe for use in a file name.
///
/// Separators and spaces become `_`; shell-hostile punctuation is dropped.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter_map(|c| match c {
            '/' | '\\' | ' ' => Some('_'),
            ':' | '*' | '?' | '"' | '\'' => None,
            other => Some(other),
        })
        .collect()
}

/// Prefix shared by every archive of `base`.
#[must_use]
pub fn archive_prefix(base: &str) -> String {
    format!("{base}-backup-")
}

/// `<base>-backup-<YYYYMMDD-HHMMSS>.tar.gz` for the current local time.
#[must_use]
pub fn archive_name(base: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    format!("{}{timestamp}{ARCHIVE_SUFFIX}", archive_prefix(base))
}

/// Creates a new, empty archive file for `base` in `dir`.
///
/// An existing archive is never replaced: a name taken within the same
/// second gets a `-1`, `-2`, ... suffix.
pub fn create_archive(dir: &Path, base: &str) -> Result<(PathBuf, File)> {
    let name = archive_name(base);
    let stem = name.strip_suffix(ARCHIVE_SUFFIX).unwrap_or(&name).to_string();
    let mut attempt = 0u32;
    loop {
        let candidate = if attempt == 0 {
            name.clone()
        } else {
            format!("{stem}-{attempt}{ARCHIVE_SUFFIX}")
        };
        let path = dir.join(candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(BackupError::archive(&path, &e)),
        }
    }
}

/// Packs the contents of `source` into a gzip tarball at `dest`.
pub fn pack(source: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest).map_err(|e| BackupError::archive(dest, &e))?;
    pack_into(source, file, dest)
}

/// Packs the contents of `source` into the already opened `file` at `dest`.
pub fn pack_into(source: &Path, file: File, dest: &Path) -> Result<()> {
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder
        .append_dir_all(".", source)
        .map_err(|e| BackupError::archive(dest, &e))?;
    builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .map_err(|e| BackupError::archive(dest, &e))?;
    Ok(())
}

/// Unpacks the gzip tarball at `archive` into `dest`.
pub fn unpack(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| BackupError::archive(archive, &e))?;
    tar::Archive::new(GzDecoder::new(file))
        .unpack(dest)
        .map_err(|e| BackupError::archive(archive, &e))
}

/// Archives of `base` in `dir`, oldest first by modification time.
pub fn list_archives(dir: &Path, base: &str) -> Result<Vec<PathBuf>> {
    let prefix = archive_prefix(base);
    let mut archives: Vec<(PathBuf, SystemTime)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && name.ends_with(ARCHIVE_SUFFIX) {
            let modified = entry.metadata()?.modified()?;
            archives.push((entry.path(), modified));
        }
    }
    archives.sort_by_key(|(_, modified)| *modified);
    Ok(archives.into_iter().map(|(path, _)| path).collect())
}

/// Deletes the oldest archives of `base` until at most `keep` remain.
///
/// Returns the removed paths.
pub fn enforce_retention(dir: &Path, base: &str, keep: usize) -> Result<Vec<PathBuf>> {
    let archives = list_archives(dir, base)?;
    let excess = archives.len().saturating_sub(keep);
    let removed: Vec<PathBuf> = archives.into_iter().take(excess).collect();
    for path in &removed {
        std::fs::remove_file(path)?;
        tracing::info!(archive = %path.display(), "removed old backup");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn touch(path: &Path, age_secs: u64) {
        let file = File::create(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Hytale Server: EU/West"), "Hytale_Server_EU_West");
        assert_eq!(sanitize_name("it's \"fine\"?*"), "its_fine");
        assert_eq!(sanitize_name(r"a\b"), "a_b");
    }

    #[test]
    fn test_archive_name_shape() {
        let name = archive_name("Hytale");
        assert!(name.starts_with("Hytale-backup-"));
        assert!(name.ends_with(".tar.gz"));
        // YYYYMMDD-HHMMSS
        let stamp = &name["Hytale-backup-".len()..name.len() - ARCHIVE_SUFFIX.len()];
        assert_eq!(stamp.len(), 15);
        assert_eq!(&stamp[8..9], "-");
    }

    #[test]
    fn test_create_archive_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _) = create_archive(dir.path(), "game").unwrap();
        std::fs::write(&first, b"first snapshot").unwrap();
        let (second, _) = create_archive(dir.path(), "game").unwrap();
        let (third, _) = create_archive(dir.path(), "game").unwrap();

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_eq!(std::fs::read(&first).unwrap(), b"first snapshot");
        assert_eq!(list_archives(dir.path(), "game").unwrap().len(), 3);
    }

    #[test]
    fn test_pack_then_unpack_tree() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("stage");
        std::fs::create_dir_all(source.join("save/worlds/default")).unwrap();
        std::fs::write(source.join("save/worlds/default/region.bin"), b"\x00\x01").unwrap();
        std::fs::create_dir_all(source.join("config")).unwrap();
        std::fs::write(source.join("config/manager.ini"), "[Discord]\nenabled = True\n").unwrap();

        let archive = dir.path().join("a.tar.gz");
        pack(&source, &archive).unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        unpack(&archive, &out).unwrap();

        assert_eq!(
            std::fs::read(out.join("save/worlds/default/region.bin")).unwrap(),
            b"\x00\x01"
        );
        assert_eq!(
            std::fs::read_to_string(out.join("config/manager.ini")).unwrap(),
            "[Discord]\nenabled = True\n"
        );
    }

    #[test]
    fn test_unpack_garbage_is_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.tar.gz");
        std::fs::write(&archive, "not gzip").unwrap();
        let err = unpack(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, BackupError::Archive { .. }));
    }

    #[test]
    fn test_retention_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for (i, age) in [500, 100, 300, 400, 200].into_iter().enumerate() {
            touch(&dir.path().join(format!("game-backup-2026010{i}-000000.tar.gz")), age);
        }
        touch(&dir.path().join("other-backup-20260101-000000.tar.gz"), 900);
        touch(&dir.path().join("game-backup-notes.txt"), 900);

        let removed = enforce_retention(dir.path(), "game", 2).unwrap();
        assert_eq!(removed.len(), 3);

        let left: Vec<String> = list_archives(dir.path(), "game")
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        // ages 200 and 100, oldest first
        assert_eq!(left, ["game-backup-20260104-000000.tar.gz", "game-backup-20260101-000000.tar.gz"]);
        assert!(dir.path().join("other-backup-20260101-000000.tar.gz").exists());
        assert!(dir.path().join("game-backup-notes.txt").exists());
    }
}
