//! Staging, archiving and restoring the files an [`Orchestrator`] manages.
//!
//! Staging and restore trees are [`TempDir`]s under the installation root,
//! so they disappear on every exit path, including errors half-way through
//! a restore.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use warden_config::Owner;
use warden_core::{ManifestKind, Orchestrator};

use crate::archive;
use crate::error::{BackupError, Result};

/// A prepared backup waiting to be archived.
#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
    staged: usize,
}

impl Staging {
    /// Root of the staged tree.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Number of files and directories copied in.
    #[must_use]
    pub const fn staged(&self) -> usize {
        self.staged
    }
}

/// Backup and restore for one application.
#[derive(Debug)]
pub struct BackupEngine<'a> {
    orchestrator: &'a Orchestrator,
}

impl<'a> BackupEngine<'a> {
    /// Creates an engine over `orchestrator`.
    #[must_use]
    pub const fn new(orchestrator: &'a Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Archive base name derived from the application name.
    #[must_use]
    pub fn base_name(&self) -> String {
        archive::sanitize_name(self.orchestrator.name())
    }

    fn root(&self) -> &Path {
        self.orchestrator.context().root()
    }

    /// Owner applied to written files when running privileged.
    fn owner(&self) -> Result<Option<Owner>> {
        if self.orchestrator.context().privileged() {
            Ok(Some(Owner::of(self.root())?))
        } else {
            Ok(None)
        }
    }

    /// Copies every config and save entry into a fresh staging tree.
    ///
    /// Missing sources are logged and skipped.
    pub fn prepare(&self) -> Result<Staging> {
        let dir = tempfile::Builder::new().prefix(".save").tempdir_in(self.root())?;
        std::fs::create_dir_all(dir.path().join("config"))?;
        std::fs::create_dir_all(dir.path().join("save"))?;
        for service in self.orchestrator.services() {
            std::fs::create_dir_all(dir.path().join(service.unit()))?;
        }

        let mut staged = 0;
        for entry in self.orchestrator.backup_manifest() {
            if !entry.source.exists() {
                match entry.kind {
                    ManifestKind::Config => {
                        tracing::debug!(source = %entry.source.display(), "config file not present, skipping");
                    }
                    ManifestKind::SaveFile | ManifestKind::SaveDirectory => {
                        tracing::warn!(source = %entry.source.display(), "save file does not exist, skipping");
                    }
                }
                continue;
            }
            let dest = dir.path().join(&entry.destination);
            if entry.source.is_dir() {
                tracing::info!(source = %entry.source.display(), "backing up directory");
                copy_tree(&entry.source, &dest)?;
            } else {
                tracing::info!(source = %entry.source.display(), "backing up file");
                copy_file(&entry.source, &dest)?;
            }
            staged += 1;
        }
        Ok(Staging { dir, staged })
    }

    /// Archives `staging` into the backup directory and applies retention.
    ///
    /// `max_backups == 0` keeps every archive. Returns the archive path.
    pub fn complete(&self, staging: Staging, max_backups: usize) -> Result<PathBuf> {
        let owner = self.owner()?;
        let target = self.orchestrator.backup_directory();
        if !target.exists() {
            std::fs::create_dir_all(target)?;
            if let Some(owner) = owner {
                owner.apply(target)?;
            }
        }

        let base = self.base_name();
        let (path, file) = archive::create_archive(target, &base)?;
        tracing::info!(archive = %path.display(), files = staging.staged(), "creating backup archive");
        if let Err(e) = archive::pack_into(staging.path(), file, &path) {
            if let Err(cleanup) = std::fs::remove_file(&path) {
                tracing::warn!(archive = %path.display(), error = %cleanup, "could not remove partial archive");
            }
            return Err(e);
        }
        if let Some(owner) = owner {
            owner.apply(&path)?;
        }
        drop(staging);

        if max_backups > 0 {
            archive::enforce_retention(target, &base, max_backups)?;
        }
        Ok(path)
    }

    /// [`prepare`](Self::prepare) then [`complete`](Self::complete).
    pub fn backup(&self, max_backups: usize) -> Result<PathBuf> {
        let staging = self.prepare()?;
        let path = self.complete(staging, max_backups)?;
        tracing::info!(archive = %path.display(), "backup saved");
        Ok(path)
    }

    /// Restores configs and saves from `archive_path`.
    ///
    /// Refuses while any instance is running, starting or stopping. Returns
    /// the paths written.
    pub async fn restore(&self, archive_path: &Path) -> Result<Vec<PathBuf>> {
        if !archive_path.exists() {
            return Err(BackupError::not_found(format!(
                "backup file {}",
                archive_path.display()
            )));
        }
        if self.orchestrator.is_active().await {
            return Err(BackupError::conflict(
                "game server is currently running, stop it before restoring a backup",
            ));
        }

        let owner = self.owner()?;
        let tree = tempfile::Builder::new().prefix(".restore").tempdir_in(self.root())?;
        tracing::info!(archive = %archive_path.display(), "extracting backup archive");
        archive::unpack(archive_path, tree.path())?;

        let mut restored = Vec::new();
        let config_paths: Vec<PathBuf> = self.orchestrator.shared().store().paths().map(Path::to_path_buf).collect();
        for dest in config_paths {
            if let Some(src) = staged_for(&tree.path().join("config"), &dest) {
                restore_file(&src, &dest, owner)?;
                restored.push(dest);
            }
        }
        for service in self.orchestrator.services() {
            let dir = tree.path().join(service.unit());
            if !dir.is_dir() {
                continue;
            }
            for dest in service.config_paths() {
                if let Some(src) = staged_for(&dir, &dest) {
                    restore_file(&src, &dest, owner)?;
                    restored.push(dest);
                }
            }
        }

        let saves = tree.path().join("save");
        if let (Some(save_dir), true) = (self.orchestrator.save_directory(), saves.is_dir()) {
            for item in std::fs::read_dir(&saves)? {
                let src = item?.path();
                let Some(name) = src.file_name() else { continue };
                let dest = save_dir.join(name);
                tracing::info!(dest = %dest.display(), "restoring save data");
                if src.is_dir() {
                    copy_tree(&src, &dest)?;
                } else {
                    copy_file(&src, &dest)?;
                }
                if let Some(owner) = owner {
                    owner.apply_recursive(&dest)?;
                }
                restored.push(dest);
            }
        }
        Ok(restored)
    }
}

/// File in `dir` with the basename of `dest`, if present.
fn staged_for(dir: &Path, dest: &Path) -> Option<PathBuf> {
    let src = dir.join(dest.file_name()?);
    src.is_file().then_some(src)
}

fn restore_file(src: &Path, dest: &Path, owner: Option<Owner>) -> Result<()> {
    tracing::info!(dest = %dest.display(), "restoring configuration file");
    copy_file(src, dest)?;
    if let Some(owner) = owner {
        owner.apply(dest)?;
    }
    Ok(())
}

fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dest)?;
    Ok(())
}

/// Recursive copy merging into an existing `dest`.
fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
