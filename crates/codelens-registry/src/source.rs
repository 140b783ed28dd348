use async_trait::async_trait;
use codelens_core::{ClassRecord, CodeLensError, EntitySnapshotFile, MethodRecord, PackageRecord};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{RegistryError, Result};

/// Source of truth for a bulk reload, typically the code graph store.
///
/// Each collection is fetched independently so a failure in one does not
/// prevent the others from refreshing.
#[async_trait]
pub trait EntitySource: Send + Sync {
    fn name(&self) -> &str;

    async fn load_classes(&self) -> Result<Vec<ClassRecord>>;

    async fn load_methods(&self) -> Result<Vec<MethodRecord>>;

    async fn load_packages(&self) -> Result<Vec<PackageRecord>>;
}

/// Source backed by records held in memory.
#[derive(Debug, Default)]
pub struct InMemorySource {
    data: RwLock<EntitySnapshotFile>,
    unavailable: AtomicBool,
}

impl InMemorySource {
    pub fn new(data: EntitySnapshotFile) -> Self {
        Self {
            data: RwLock::new(data),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Swap the records served on the next load.
    pub fn replace(&self, data: EntitySnapshotFile) {
        *self.data.write() = data;
    }

    /// Make every load fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RegistryError::SourceUnavailable(
                "in-memory source marked unavailable".into(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EntitySource for InMemorySource {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn load_classes(&self) -> Result<Vec<ClassRecord>> {
        self.check_available()?;
        Ok(self.data.read().classes.clone())
    }

    async fn load_methods(&self) -> Result<Vec<MethodRecord>> {
        self.check_available()?;
        Ok(self.data.read().methods.clone())
    }

    async fn load_packages(&self) -> Result<Vec<PackageRecord>> {
        self.check_available()?;
        Ok(self.data.read().packages.clone())
    }
}

/// Source that re-reads a JSON export on every load.
#[derive(Debug, Clone)]
pub struct JsonSnapshotSource {
    path: PathBuf,
}

impl JsonSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<EntitySnapshotFile> {
        let path = self.path.clone();
        let loaded = tokio::task::spawn_blocking(move || EntitySnapshotFile::read(&path))
            .await
            .map_err(|e| RegistryError::SourceUnavailable(e.to_string()))?;

        match loaded {
            Ok(snapshot) => Ok(snapshot),
            Err(CodeLensError::Io(e)) => Err(RegistryError::SourceUnavailable(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
            Err(other) => Err(other.into()),
        }
    }
}

#[async_trait]
impl EntitySource for JsonSnapshotSource {
    fn name(&self) -> &str {
        "json-snapshot"
    }

    async fn load_classes(&self) -> Result<Vec<ClassRecord>> {
        Ok(self.read().await?.classes)
    }

    async fn load_methods(&self) -> Result<Vec<MethodRecord>> {
        Ok(self.read().await?.methods)
    }

    async fn load_packages(&self) -> Result<Vec<PackageRecord>> {
        Ok(self.read().await?.packages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> EntitySnapshotFile {
        EntitySnapshotFile {
            classes: vec![ClassRecord {
                id: "c1".into(),
                name: "PaymentService".into(),
                ..Default::default()
            }],
            methods: vec![MethodRecord {
                id: "m1".into(),
                name: "processPayment".into(),
                class_name: "PaymentService".into(),
                ..Default::default()
            }],
            packages: vec![],
        }
    }

    #[tokio::test]
    async fn in_memory_source_can_be_toggled() {
        let source = InMemorySource::new(sample());
        assert_eq!(source.load_classes().await.unwrap().len(), 1);

        source.set_unavailable(true);
        assert!(matches!(
            source.load_methods().await,
            Err(RegistryError::SourceUnavailable(_))
        ));

        source.set_unavailable(false);
        source.replace(EntitySnapshotFile::default());
        assert!(source.load_classes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn json_source_reads_export() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entities.json");
        sample().write(&path).unwrap();

        let source = JsonSnapshotSource::new(&path);
        assert_eq!(source.load_classes().await.unwrap()[0].name, "PaymentService");
        assert_eq!(source.load_methods().await.unwrap()[0].name, "processPayment");
        assert!(source.load_packages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn json_source_reports_missing_and_malformed_files() {
        let dir = TempDir::new().unwrap();

        let missing = JsonSnapshotSource::new(dir.path().join("absent.json"));
        assert!(matches!(
            missing.load_classes().await,
            Err(RegistryError::SourceUnavailable(_))
        ));

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let broken = JsonSnapshotSource::new(&path);
        assert!(matches!(
            broken.load_classes().await,
            Err(RegistryError::Core(CodeLensError::Serialization(_)))
        ));
    }
}
