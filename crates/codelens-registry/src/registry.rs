use arc_swap::ArcSwap;
use codelens_core::{
    ClassEntity, ClassRecord, EntityMatch, MethodEntity, MethodRecord, PackageEntity,
    PackageRecord, Vocabulary,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{RegistryError, Result};
use crate::snapshot::{
    classes_from_records, methods_from_records, packages_from_records, RegistrySnapshot,
    RegistryStats,
};
use crate::source::EntitySource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    /// A new snapshot was built and installed
    Refreshed,
    /// Nothing usable was loaded; the previous snapshot is still installed
    KeptPrevious,
    /// Another refresh was in flight
    AlreadyRunning,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub status: RefreshStatus,
    pub generation: u64,
    pub classes: usize,
    pub methods: usize,
    pub packages: usize,
    pub skipped_records: usize,
    pub duration: Duration,
    pub errors: Vec<String>,
}

impl RefreshReport {
    fn from_snapshot(
        status: RefreshStatus,
        snapshot: &RegistrySnapshot,
        duration: Duration,
        errors: Vec<String>,
    ) -> Self {
        let stats = snapshot.stats();
        Self {
            status,
            generation: stats.generation,
            classes: stats.classes,
            methods: stats.methods,
            packages: stats.packages,
            skipped_records: stats.skipped_records,
            duration,
            errors,
        }
    }
}

/// In-memory entity registry.
///
/// Queries read whichever snapshot is installed and never block on a refresh.
/// Refreshes are serialized and replace the snapshot with a single pointer swap.
pub struct EntityRegistry {
    source: Arc<dyn EntitySource>,
    vocabulary: Vocabulary,
    snapshot: ArcSwap<RegistrySnapshot>,
    refresh_lock: Mutex<()>,
}

impl EntityRegistry {
    pub fn new(source: Arc<dyn EntitySource>, vocabulary: Vocabulary) -> Self {
        Self {
            source,
            vocabulary,
            snapshot: ArcSwap::from_pointee(RegistrySnapshot::empty()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Create a registry and run the initial load.
    pub async fn load(source: Arc<dyn EntitySource>, vocabulary: Vocabulary) -> Self {
        let registry = Self::new(source, vocabulary);
        let report = registry.refresh().await;
        if report.status != RefreshStatus::Refreshed {
            warn!(errors = ?report.errors, "initial registry load produced no entities");
        }
        registry
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// The currently installed snapshot. Holding it pins that generation.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot.load().generation()
    }

    pub fn stats(&self) -> RegistryStats {
        self.snapshot.load().stats()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Reload everything from the source and swap in a rebuilt snapshot.
    ///
    /// Never fails: a collection whose load fails is carried forward from the
    /// previous snapshot, and a load that yields no classes or methods leaves
    /// the previous snapshot installed.
    pub async fn refresh(&self) -> RefreshReport {
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            debug!("registry refresh already in progress");
            return RefreshReport::from_snapshot(
                RefreshStatus::AlreadyRunning,
                &self.snapshot.load(),
                Duration::ZERO,
                Vec::new(),
            );
        };

        let started = Instant::now();
        let previous = self.snapshot.load_full();
        info!(source = self.source.name(), "refreshing entity registry");

        let (classes, methods, packages) = tokio::join!(
            self.source.load_classes(),
            self.source.load_methods(),
            self.source.load_packages()
        );

        let mut errors = Vec::new();
        let classes = loaded_or_logged("classes", classes, &mut errors);
        let methods = loaded_or_logged("methods", methods, &mut errors);
        let packages = loaded_or_logged("packages", packages, &mut errors);

        if classes.is_none() && methods.is_none() && packages.is_none() {
            error!("entity source unavailable, keeping previous registry snapshot");
            return RefreshReport::from_snapshot(
                RefreshStatus::KeptPrevious,
                &previous,
                started.elapsed(),
                errors,
            );
        }

        let vocabulary = self.vocabulary.clone();
        let generation = previous.generation() + 1;
        let base = Arc::clone(&previous);
        let built = tokio::task::spawn_blocking(move || {
            build_snapshot(generation, &base, &vocabulary, classes, methods, packages)
        })
        .await
        .map_err(|e| RegistryError::Build(e.to_string()));

        match built {
            Ok(Some(snapshot)) => {
                let report = RefreshReport::from_snapshot(
                    RefreshStatus::Refreshed,
                    &snapshot,
                    started.elapsed(),
                    errors,
                );
                self.snapshot.store(Arc::new(snapshot));
                info!(
                    generation = report.generation,
                    classes = report.classes,
                    methods = report.methods,
                    packages = report.packages,
                    skipped = report.skipped_records,
                    elapsed_ms = report.duration.as_millis() as u64,
                    "entity registry refreshed"
                );
                report
            }
            Ok(None) => {
                warn!("refresh loaded no classes or methods, keeping previous registry snapshot");
                RefreshReport::from_snapshot(
                    RefreshStatus::KeptPrevious,
                    &previous,
                    started.elapsed(),
                    errors,
                )
            }
            Err(e) => {
                error!(error = %e, "registry snapshot build failed");
                errors.push(e.to_string());
                RefreshReport::from_snapshot(
                    RefreshStatus::KeptPrevious,
                    &previous,
                    started.elapsed(),
                    errors,
                )
            }
        }
    }

    pub fn find_exact_matches(&self, term: &str) -> Vec<EntityMatch> {
        self.snapshot.load().find_exact_matches(term)
    }

    pub fn find_by_prefix(&self, term: &str) -> Vec<EntityMatch> {
        self.snapshot.load().find_by_prefix(term)
    }

    pub fn find_by_suffix(&self, term: &str) -> Vec<EntityMatch> {
        self.snapshot.load().find_by_suffix(term)
    }

    pub fn find_similar(&self, term: &str, max_edit_distance: i32) -> Vec<EntityMatch> {
        self.snapshot.load().find_similar(term, max_edit_distance)
    }

    pub fn find_by_compound<S: AsRef<str>>(&self, terms: &[S]) -> Vec<EntityMatch> {
        self.snapshot.load().find_by_compound(terms)
    }

    pub fn find_phonetic(&self, term: &str) -> Vec<EntityMatch> {
        self.snapshot.load().find_phonetic(term)
    }

    pub fn find_by_abbreviation(&self, abbreviation: &str) -> Vec<EntityMatch> {
        self.snapshot.load().find_by_abbreviation(abbreviation)
    }

    pub fn class(&self, id: &str) -> Option<Arc<ClassEntity>> {
        self.snapshot.load().class(id).cloned()
    }

    pub fn method(&self, id: &str) -> Option<Arc<MethodEntity>> {
        self.snapshot.load().method(id).cloned()
    }

    pub fn package(&self, name: &str) -> Option<Arc<PackageEntity>> {
        self.snapshot.load().package(name).cloned()
    }

    pub fn methods_of_class(&self, class_name: &str) -> Vec<Arc<MethodEntity>> {
        self.snapshot
            .load()
            .methods_of_class(class_name)
            .into_iter()
            .cloned()
            .collect()
    }
}

fn loaded_or_logged<T>(
    collection: &'static str,
    loaded: Result<Vec<T>>,
    errors: &mut Vec<String>,
) -> Option<Vec<T>> {
    match loaded {
        Ok(records) => {
            debug!(collection, count = records.len(), "loaded records");
            Some(records)
        }
        Err(e) => {
            warn!(collection, error = %e, "load failed, carrying previous entities forward");
            errors.push(format!("{}: {}", collection, e));
            None
        }
    }
}

fn build_snapshot(
    generation: u64,
    previous: &RegistrySnapshot,
    vocabulary: &Vocabulary,
    classes: Option<Vec<ClassRecord>>,
    methods: Option<Vec<MethodRecord>>,
    packages: Option<Vec<PackageRecord>>,
) -> Option<RegistrySnapshot> {
    let mut skipped = 0;

    let classes = match classes {
        Some(records) => classes_from_records(records, vocabulary, &mut skipped),
        None => previous.classes().cloned().collect(),
    };
    let methods = match methods {
        Some(records) => methods_from_records(records, vocabulary, &mut skipped),
        None => previous.methods().cloned().collect(),
    };
    let packages = match packages {
        Some(records) => packages_from_records(records, &mut skipped),
        None => previous.packages().cloned().collect(),
    };

    if classes.is_empty() && methods.is_empty() {
        return None;
    }

    Some(RegistrySnapshot::build(
        generation, classes, methods, packages, skipped,
    ))
}

/// Refresh `registry` every `period` until `cancel` fires. The first tick runs
/// immediately.
pub fn spawn_refresh_loop(
    registry: Arc<EntityRegistry>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_secs = period.as_secs_f64(), "registry refresh loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("registry refresh loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let report = registry.refresh().await;
                    debug!(status = ?report.status, generation = report.generation, "scheduled refresh finished");
                }
            }
        }
    })
}
