//! Backup and restore against a real directory tree.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use warden_backup::{BackupEngine, BackupError, list_archives};
use warden_core::{
    ActiveState, ManagerConfig, ManagerContext, Orchestrator, ProcessManager, ResourceUsage,
};

/// Process manager whose only unit is either active or not.
#[derive(Debug, Default)]
struct FixedState {
    active: AtomicBool,
}

#[async_trait]
impl ProcessManager for FixedState {
    async fn start(&self, _unit: &str) -> warden_core::Result<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self, _unit: &str) -> warden_core::Result<()> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn enable(&self, _unit: &str) -> warden_core::Result<()> {
        Ok(())
    }

    async fn disable(&self, _unit: &str) -> warden_core::Result<()> {
        Ok(())
    }

    async fn active_state(&self, _unit: &str) -> warden_core::Result<ActiveState> {
        Ok(if self.active.load(Ordering::SeqCst) {
            ActiveState::Active
        } else {
            ActiveState::Inactive
        })
    }

    async fn is_enabled(&self, _unit: &str) -> warden_core::Result<bool> {
        Ok(true)
    }

    async fn property(&self, _unit: &str, _name: &str) -> warden_core::Result<String> {
        Ok(String::new())
    }

    async fn logs(&self, _unit: &str, _lines: usize) -> warden_core::Result<String> {
        Ok(String::new())
    }

    async fn resource_usage(&self, _pid: u32) -> warden_core::Result<ResourceUsage> {
        Ok(ResourceUsage::default())
    }
}

const CONFIG: &str = r#"
name = "Hytale EU"
save_directory = "universe"
save_files = ["worlds", "bans.json"]

[[documents]]
group = "manager"
path = "manager.ini"

[[services]]
unit = "alpha"

[[services.documents]]
group = "server"
path = "Server/alpha.properties"
"#;

const MANAGER_INI: &str = "[Discord]\nenabled = False\n";
const ALPHA_PROPERTIES: &str = "server-port=5520\n";

fn install(root: &Path) {
    std::fs::write(root.join("manager.ini"), MANAGER_INI).unwrap();
    std::fs::create_dir_all(root.join("Server")).unwrap();
    std::fs::write(root.join("Server/alpha.properties"), ALPHA_PROPERTIES).unwrap();
    std::fs::create_dir_all(root.join("universe/worlds/default")).unwrap();
    std::fs::write(root.join("universe/worlds/default/chunk.bin"), b"\x01\x02\x03").unwrap();
}

fn orchestrator(root: &Path, manager: &Arc<FixedState>) -> Orchestrator {
    let config = ManagerConfig::from_toml_str(CONFIG).unwrap();
    let ctx = ManagerContext::detect(root, config.timings.clone()).with_privileged(false);
    Orchestrator::from_config(&config, ctx, Arc::clone(manager) as Arc<dyn ProcessManager>).unwrap()
}

fn leftovers(root: &Path) -> Vec<String> {
    std::fs::read_dir(root)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".save") || name.starts_with(".restore"))
        .collect()
}

#[tokio::test]
async fn backup_then_restore_brings_files_back() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    install(root);
    let manager = Arc::new(FixedState::default());
    let app = orchestrator(root, &manager);
    let engine = BackupEngine::new(&app);

    let archive = engine.backup(0).unwrap();
    assert!(archive.starts_with(root.join("backups")));
    let name = archive.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("Hytale_EU-backup-"), "{name}");
    assert!(leftovers(root).is_empty());

    std::fs::write(root.join("manager.ini"), "[Discord]\nenabled = True\n").unwrap();
    std::fs::write(root.join("Server/alpha.properties"), "server-port=1\n").unwrap();
    std::fs::remove_dir_all(root.join("universe/worlds")).unwrap();

    let restored = engine.restore(&archive).await.unwrap();

    assert_eq!(restored.len(), 3);
    assert_eq!(std::fs::read_to_string(root.join("manager.ini")).unwrap(), MANAGER_INI);
    assert_eq!(
        std::fs::read_to_string(root.join("Server/alpha.properties")).unwrap(),
        ALPHA_PROPERTIES
    );
    assert_eq!(
        std::fs::read(root.join("universe/worlds/default/chunk.bin")).unwrap(),
        b"\x01\x02\x03"
    );
    assert!(!root.join("universe/bans.json").exists());
    assert!(leftovers(root).is_empty());
}

#[tokio::test]
async fn restore_refuses_live_instance() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    install(root);
    let manager = Arc::new(FixedState::default());
    let app = orchestrator(root, &manager);
    let engine = BackupEngine::new(&app);
    let archive = engine.backup(0).unwrap();

    std::fs::write(root.join("manager.ini"), "[Discord]\nenabled = True\n").unwrap();
    manager.active.store(true, Ordering::SeqCst);

    let err = engine.restore(&archive).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(
        std::fs::read_to_string(root.join("manager.ini")).unwrap(),
        "[Discord]\nenabled = True\n"
    );
    assert!(leftovers(root).is_empty());
}

#[tokio::test]
async fn restore_of_missing_archive_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    install(dir.path());
    let manager = Arc::new(FixedState::default());
    let app = orchestrator(dir.path(), &manager);

    let err = BackupEngine::new(&app)
        .restore(&dir.path().join("backups/nope.tar.gz"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::NotFound(_)));
}

#[tokio::test]
async fn retention_keeps_most_recent_archives() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    install(root);
    let backups = root.join("backups");
    std::fs::create_dir_all(&backups).unwrap();
    for (day, age) in [(1, 300), (2, 200), (3, 100)] {
        let file = std::fs::File::create(backups.join(format!("Hytale_EU-backup-2020010{day}-120000.tar.gz"))).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age)).unwrap();
    }
    let manager = Arc::new(FixedState::default());
    let app = orchestrator(root, &manager);

    let archive = BackupEngine::new(&app).backup(2).unwrap();

    let kept = list_archives(&backups, "Hytale_EU").unwrap();
    assert_eq!(kept, [backups.join("Hytale_EU-backup-20200103-120000.tar.gz"), archive]);
}

#[test]
fn backups_in_the_same_second_are_all_kept() {
    let dir = tempfile::tempdir().unwrap();
    install(dir.path());
    let manager = Arc::new(FixedState::default());
    let app = orchestrator(dir.path(), &manager);
    let engine = BackupEngine::new(&app);

    let first = engine.backup(0).unwrap();
    let second = engine.backup(0).unwrap();

    assert_ne!(first, second);
    assert!(first.exists());
    assert_eq!(list_archives(&dir.path().join("backups"), "Hytale_EU").unwrap().len(), 2);
}

#[test]
fn failed_archive_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    install(dir.path());
    let manager = Arc::new(FixedState::default());
    let app = orchestrator(dir.path(), &manager);
    let engine = BackupEngine::new(&app);

    let staging = engine.prepare().unwrap();
    std::fs::remove_dir_all(staging.path()).unwrap();
    assert!(engine.complete(staging, 0).is_err());

    let backups = dir.path().join("backups");
    assert_eq!(std::fs::read_dir(&backups).unwrap().count(), 0);
}
