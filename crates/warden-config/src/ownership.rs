//! File ownership inheritance for files written with elevated privileges.
//!
//! When the manager runs as root, every file it writes takes the owner of the
//! nearest existing ancestor directory so the game user can still read it.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// A uid/gid pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    /// User id.
    pub uid: u32,
    /// Group id.
    pub gid: u32,
}

impl Owner {
    /// Reads the owner of an existing path.
    #[cfg(unix)]
    pub fn of(path: &Path) -> Result<Self> {
        use std::os::unix::fs::MetadataExt;

        let meta = std::fs::metadata(path)?;
        Ok(Self {
            uid: meta.uid(),
            gid: meta.gid(),
        })
    }

    /// Reads the owner of an existing path.
    #[cfg(not(unix))]
    pub fn of(path: &Path) -> Result<Self> {
        std::fs::metadata(path)?;
        Ok(Self { uid: 0, gid: 0 })
    }

    /// Applies this owner to `path`.
    #[cfg(unix)]
    pub fn apply(&self, path: &Path) -> Result<()> {
        use nix::unistd::{Gid, Uid, chown};

        chown(path, Some(Uid::from_raw(self.uid)), Some(Gid::from_raw(self.gid))).map_err(|e| {
            ConfigError::PermissionDenied(format!("chown {}: {e}", path.display()))
        })
    }

    /// Applies this owner to `path`.
    #[cfg(not(unix))]
    pub fn apply(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    /// Applies this owner to `path` and, for directories, everything below it.
    pub fn apply_recursive(&self, path: &Path) -> Result<()> {
        self.apply(path)?;
        if path.is_dir() {
            for entry in std::fs::read_dir(path)? {
                self.apply_recursive(&entry?.path())?;
            }
        }
        Ok(())
    }
}

/// Returns the nearest existing directory at or above `path`'s parent.
#[must_use]
pub fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.parent()?
        .ancestors()
        .find(|dir| !dir.as_os_str().is_empty() && dir.is_dir())
        .map(Path::to_path_buf)
}

/// Owner of the nearest existing ancestor of `path`, if one exists.
pub fn inherited_owner(path: &Path) -> Result<Option<Owner>> {
    nearest_existing_ancestor(path)
        .map(|dir| Owner::of(&dir))
        .transpose()
}

/// Creates `dir` and any missing parents, giving each created directory `owner`.
pub fn create_dir_all_owned(dir: &Path, owner: Option<Owner>) -> Result<()> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    if let Some(parent) = dir.parent() {
        create_dir_all_owned(parent, owner)?;
    }
    std::fs::create_dir(dir)?;
    if let Some(owner) = owner {
        owner.apply(dir)?;
    }
    Ok(())
}

/// Gives a freshly written file the owner of its nearest existing ancestor.
///
/// Does nothing unless `privileged` is set.
pub fn inherit_owner(path: &Path, privileged: bool) -> Result<()> {
    if !privileged {
        return Ok(());
    }
    if let Some(owner) = inherited_owner(path)? {
        owner.apply(path)?;
        tracing::debug!(path = %path.display(), uid = owner.uid, gid = owner.gid, "applied inherited owner");
    }
    Ok(())
}

/// Prepares the parent directory of `path` for writing.
///
/// Missing directories are created; when privileged they receive the owner
/// of the nearest directory that already existed.
pub fn prepare_parent(path: &Path, privileged: bool) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent.is_dir() {
        return Ok(());
    }
    let owner = if privileged { inherited_owner(path)? } else { None };
    create_dir_all_owned(parent, owner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_existing_ancestor_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a/b/c/server.properties");
        assert_eq!(nearest_existing_ancestor(&file).unwrap(), dir.path());
    }

    #[test]
    fn test_nearest_existing_ancestor_direct_parent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.ini");
        assert_eq!(nearest_existing_ancestor(&file).unwrap(), dir.path());
    }

    #[test]
    fn test_prepare_parent_creates_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x/y/file.txt");
        prepare_parent(&file, false).unwrap();
        assert!(dir.path().join("x/y").is_dir());
    }

    #[test]
    fn test_inherit_owner_noop_unprivileged() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, "x").unwrap();
        inherit_owner(&file, false).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_inherit_owner_matches_parent_when_root() {
        if !nix::unistd::geteuid().is_root() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested/f");
        prepare_parent(&file, true).unwrap();
        std::fs::write(&file, "x").unwrap();
        inherit_owner(&file, true).unwrap();
        assert_eq!(Owner::of(&file).unwrap(), Owner::of(dir.path()).unwrap());
        assert_eq!(Owner::of(&dir.path().join("nested")).unwrap(), Owner::of(dir.path()).unwrap());
    }
}
