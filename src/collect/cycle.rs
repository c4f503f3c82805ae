// ============================================================================
// Collection Cycle
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::derive::{FileMetricsDeriver, Severity};
use crate::error::{CycleError, MetricsResult, SourceError};
use crate::metrics::{catalog, MetricsStore};
use crate::source::{LogFile, ServiceClassifier, Source, SourceEnumerator, SourceKind};
use crate::COLLECTOR_SERVICE;

/// Unit of work the scheduler drives once per tick.
pub trait CycleRunner: Send + Sync + 'static {
    /// Run one complete pass. Never fails: per-source problems are reported
    /// through the returned result.
    fn run_cycle(&self) -> CycleResult;
}

/// Outcome of one collection pass.
#[derive(Debug, Default)]
pub struct CycleResult {
    /// Sources visited, including skipped ones.
    pub attempted: usize,
    /// Sources whose root did not exist.
    pub skipped: usize,
    /// Sources whose traversal failed.
    pub failed: usize,
    /// Log files recorded.
    pub files: usize,
    /// Most recent traversal failure, present whenever `failed > 0`.
    pub last_error: Option<SourceError>,
    pub elapsed: Duration,
}

impl CycleResult {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Collapse a pass that completed with errors into one aggregate error.
    pub fn into_result(mut self) -> Result<Self, CycleError> {
        match self.last_error.take() {
            Some(last) if self.failed > 0 => Err(CycleError::PartialFailure {
                failed: self.failed,
                attempted: self.attempted,
                last: Box::new(last),
            }),
            last => {
                self.last_error = last;
                Ok(self)
            }
        }
    }
}

/// One pass over the configured sources, recording into a shared store.
pub struct CollectionCycle {
    store: Arc<MetricsStore>,
    sources: Vec<Source>,
    enumerator: Arc<dyn SourceEnumerator>,
    deriver: Arc<dyn FileMetricsDeriver>,
    classifier: Arc<dyn ServiceClassifier>,
    started_at: Instant,
    dedupe: bool,
}

impl CollectionCycle {
    /// Create a cycle with no sources. Uptime is measured from now.
    pub fn new(
        store: Arc<MetricsStore>,
        enumerator: Arc<dyn SourceEnumerator>,
        deriver: Arc<dyn FileMetricsDeriver>,
        classifier: Arc<dyn ServiceClassifier>,
    ) -> Self {
        Self {
            store,
            sources: Vec::new(),
            enumerator,
            deriver,
            classifier,
            started_at: Instant::now(),
            dedupe: false,
        }
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = Source>) -> Self {
        self.sources = sources.into_iter().collect();
        self
    }

    /// Measure uptime from the given instant (normally process start).
    pub fn with_started_at(mut self, started_at: Instant) -> Self {
        self.started_at = started_at;
        self
    }

    /// Skip directory-pass files already covered by a named service root.
    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    fn collect_source(&self, source: &Source, covered: &[PathBuf], result: &mut CycleResult) {
        result.attempted += 1;
        let root = source.root();

        if !self.enumerator.exists(root) {
            debug!(target: "snaproom::collect", source = %source, "Source root missing, skipping");
            result.skipped += 1;
            return;
        }

        let canonical_root = match source {
            Source::Directory { .. } if !covered.is_empty() => self.enumerator.canonical_root(root),
            _ => None,
        };

        for entry in self.enumerator.list_log_files(root) {
            match entry {
                Ok(file) => {
                    if let Some(canonical_root) = &canonical_root {
                        if is_covered(&file.path, root, canonical_root, covered) {
                            continue;
                        }
                    }
                    self.record_file(source, &file);
                    result.files += 1;
                }
                Err(err) => {
                    self.record_failure(source, err, result);
                    return;
                }
            }
        }
    }

    fn record_file(&self, source: &Source, file: &LogFile) {
        let (service, lines, severity) = match source {
            Source::Service { service, .. } => {
                let est = self.deriver.derive(file, SourceKind::Service);
                (service.clone(), est.lines, est.severity)
            }
            Source::Directory { .. } => {
                let est = self.deriver.derive(file, SourceKind::Directory);
                // raw directories carry no per-level signal
                (self.classifier.classify(&file.path), est.lines, Severity::Info)
            }
        };

        self.write(self.store.set_gauge(
            &catalog::FILE_SIZE,
            &[service.as_str(), file.file_name.as_str()],
            file.size_bytes as f64,
        ));
        self.write(self.store.add_counter(
            &catalog::LOGS_COLLECTED,
            &[service.as_str(), severity.as_str()],
            lines,
        ));

        debug!(
            target: "snaproom::collect",
            service = %service,
            file = %file.file_name,
            size_bytes = file.size_bytes,
            lines = format_args!("{lines:.2}"),
            level = %severity,
            "Processed log file"
        );
    }

    fn record_failure(&self, source: &Source, err: SourceError, result: &mut CycleResult) {
        let (service, error_type): (&str, &str) = match source {
            Source::Service { service, .. } => (service.as_str(), catalog::ERROR_COLLECTION),
            Source::Directory { .. } => (COLLECTOR_SERVICE, catalog::ERROR_DIRECTORY),
        };

        self.write(self.store.add_counter(&catalog::LOG_ERRORS, &[service, error_type], 1.0));
        error!(
            target: "snaproom::collect",
            service,
            source = %source,
            error = %err,
            "Error collecting logs from source"
        );

        result.failed += 1;
        result.last_error = Some(err);
    }

    /// Canonical roots of the named services that currently exist.
    fn covered_roots(&self) -> Vec<PathBuf> {
        if !self.dedupe {
            return Vec::new();
        }
        self.sources
            .iter()
            .filter(|s| s.kind() == SourceKind::Service)
            .filter_map(|s| self.enumerator.canonical_root(s.root()))
            .collect()
    }

    fn write(&self, outcome: MetricsResult<()>) {
        if let Err(err) = outcome {
            warn!(target: "snaproom::collect", error = %err, "Rejected metrics write");
        }
    }

    fn service_sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter().filter(|s| s.kind() == SourceKind::Service)
    }

    fn directory_sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter().filter(|s| s.kind() == SourceKind::Directory)
    }
}

impl CycleRunner for CollectionCycle {
    fn run_cycle(&self) -> CycleResult {
        let start = Instant::now();
        let mut result = CycleResult::default();

        let uptime = self.started_at.elapsed().as_secs_f64();
        self.write(self.store.set_gauge(&catalog::UPTIME, &[], uptime));

        for source in self.service_sources() {
            self.collect_source(source, &[], &mut result);
        }

        let covered = self.covered_roots();
        for source in self.directory_sources() {
            self.collect_source(source, &covered, &mut result);
        }

        result.elapsed = start.elapsed();
        self.write(self.store.observe_histogram(
            &catalog::PROCESSING_DURATION,
            &[COLLECTOR_SERVICE],
            result.elapsed.as_secs_f64(),
        ));
        self.write(self.store.add_counter(&catalog::CYCLES, &[], 1.0));

        info!(
            target: "snaproom::collect",
            duration_seconds = format_args!("{:.3}", result.elapsed.as_secs_f64()),
            uptime_seconds = format_args!("{uptime:.0}"),
            attempted = result.attempted,
            skipped = result.skipped,
            failed = result.failed,
            files = result.files,
            "Cycle completed"
        );

        result
    }
}

fn is_covered(path: &Path, root: &Path, canonical_root: &Path, covered: &[PathBuf]) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    let canonical = canonical_root.join(relative);
    covered.iter().any(|c| canonical.starts_with(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::{FileEstimate, SimulatedDeriver};
    use crate::source::{MockSourceEnumerator, SubstringClassifier, WalkDirEnumerator};
    use std::fs;

    const COLLECTED: &str = "snaproom_logs_collected_total";
    const FILE_SIZE: &str = "snaproom_log_file_size_bytes";
    const ERRORS: &str = "snaproom_log_errors_total";

    struct FixedDeriver(f64, Severity);

    impl FileMetricsDeriver for FixedDeriver {
        fn derive(&self, _file: &LogFile, _kind: SourceKind) -> FileEstimate {
            FileEstimate {
                lines: self.0,
                severity: self.1,
            }
        }
    }

    fn cycle_with(
        store: &Arc<MetricsStore>,
        enumerator: Arc<dyn SourceEnumerator>,
        deriver: Arc<dyn FileMetricsDeriver>,
    ) -> CollectionCycle {
        CollectionCycle::new(
            store.clone(),
            enumerator,
            deriver,
            Arc::new(SubstringClassifier::snaproom().unwrap()),
        )
    }

    fn fs_cycle(store: &Arc<MetricsStore>) -> CollectionCycle {
        cycle_with(
            store,
            Arc::new(WalkDirEnumerator::new()),
            Arc::new(SimulatedDeriver::with_seed(1)),
        )
    }

    fn write_file(path: &Path, bytes: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![b'.'; bytes]).unwrap();
    }

    fn walk_error(root: &Path) -> SourceError {
        let source = walkdir::WalkDir::new(root.join("vanished"))
            .into_iter()
            .next()
            .unwrap()
            .unwrap_err();
        SourceError::Walk {
            root: root.to_path_buf(),
            source,
        }
    }

    #[test]
    fn test_zero_sources_still_records_self_metrics() {
        let store = Arc::new(MetricsStore::new());
        let cycle = fs_cycle(&store);

        let first = cycle.run_cycle();
        assert_eq!((first.attempted, first.failed, first.files), (0, 0, 0));
        assert!(first.last_error.is_none());
        let uptime_1 = store
            .snapshot()
            .gauge("snaproom_collector_uptime_seconds", &[])
            .unwrap();

        let second = cycle.run_cycle();
        assert!(second.into_result().is_ok());

        let snap = store.snapshot();
        let uptime_2 = snap.gauge("snaproom_collector_uptime_seconds", &[]).unwrap();
        assert!(uptime_2 >= uptime_1);
        assert_eq!(snap.counter("snaproom_collector_cycles_total", &[]), Some(2.0));
        let hist = snap
            .histogram("snaproom_log_processing_duration_seconds", &["collector"])
            .unwrap();
        assert_eq!(hist.count, 2);
    }

    #[test]
    fn test_missing_root_is_skipped_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MetricsStore::new());
        let cycle = fs_cycle(&store).with_sources([
            Source::service("snaproom-react", dir.path().join("missing")),
            Source::directory(dir.path().join("also-missing")),
        ]);

        let result = cycle.run_cycle();
        assert_eq!(result.attempted, 2);
        assert_eq!(result.skipped, 2);
        assert_eq!(result.failed, 0);

        let snap = store.snapshot();
        assert_eq!(snap.series_count(FILE_SIZE), 0);
        assert_eq!(snap.series_count(COLLECTED), 0);
        assert_eq!(snap.series_count(ERRORS), 0);
    }

    #[test]
    fn test_single_file_records_size_and_one_level() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("app.log"), 1024);

        let store = Arc::new(MetricsStore::new());
        let cycle = fs_cycle(&store).with_sources([Source::service("snaproom-laravel", dir.path())]);

        let result = cycle.run_cycle();
        assert_eq!((result.attempted, result.failed, result.files), (1, 0, 1));

        let snap = store.snapshot();
        assert_eq!(snap.gauge(FILE_SIZE, &["snaproom-laravel", "app.log"]), Some(1024.0));

        let family = snap.family(COLLECTED).unwrap();
        assert_eq!(family.samples.len(), 1);
        let labels = &family.samples[0].labels;
        assert_eq!(labels[0], "snaproom-laravel");
        assert!(["info", "warn", "error", "debug"].contains(&labels[1].as_str()));
    }

    #[test]
    fn test_rescanning_unchanged_directory_accumulates_counters() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("app.log"), 1024);

        let store = Arc::new(MetricsStore::new());
        let cycle = cycle_with(
            &store,
            Arc::new(WalkDirEnumerator::new()),
            Arc::new(FixedDeriver(3.0, Severity::Warn)),
        )
        .with_sources([Source::service("api", dir.path())]);

        cycle.run_cycle();
        cycle.run_cycle();

        let snap = store.snapshot();
        assert_eq!(snap.gauge(FILE_SIZE, &["api", "app.log"]), Some(1024.0));
        assert_eq!(snap.counter(COLLECTED, &["api", "warn"]), Some(6.0));
    }

    #[test]
    fn test_directory_pass_classifies_and_fixes_level() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("laravel/app.log"), 10);
        write_file(&dir.path().join("misc/other.log"), 20);

        let store = Arc::new(MetricsStore::new());
        let cycle = cycle_with(
            &store,
            Arc::new(WalkDirEnumerator::new()),
            Arc::new(FixedDeriver(2.0, Severity::Error)),
        )
        .with_sources([Source::directory(dir.path())]);

        let result = cycle.run_cycle();
        assert_eq!(result.files, 2);

        let snap = store.snapshot();
        assert_eq!(snap.counter(COLLECTED, &["snaproom-laravel", "info"]), Some(2.0));
        assert_eq!(snap.counter(COLLECTED, &["unknown", "info"]), Some(2.0));
        assert_eq!(snap.gauge(FILE_SIZE, &["unknown", "other.log"]), Some(20.0));
        assert_eq!(snap.series_count(COLLECTED), 2);
    }

    #[test]
    fn test_traversal_failures_are_counted_and_aggregated() {
        let mut enumerator = MockSourceEnumerator::new();
        enumerator.expect_exists().return_const(true);
        enumerator.expect_list_log_files().returning(|root| {
            let file = LogFile {
                file_name: "first.log".into(),
                size_bytes: 7,
                path: root.join("first.log"),
            };
            Box::new(vec![Ok(file), Err(walk_error(root))].into_iter())
        });

        let store = Arc::new(MetricsStore::new());
        let cycle = cycle_with(
            &store,
            Arc::new(enumerator),
            Arc::new(FixedDeriver(1.0, Severity::Info)),
        )
        .with_sources([
            Source::service("snaproom-react", "/logs/react"),
            Source::directory("/logs"),
        ]);

        let result = cycle.run_cycle();
        assert_eq!(result.attempted, 2);
        assert_eq!(result.failed, 2);
        assert_eq!(result.files, 2);
        assert_eq!(result.last_error.as_ref().unwrap().root(), Path::new("/logs"));

        let snap = store.snapshot();
        assert_eq!(snap.counter(ERRORS, &["snaproom-react", "collection_error"]), Some(1.0));
        assert_eq!(snap.counter(ERRORS, &["collector", "directory_error"]), Some(1.0));
        // files seen before the failure are still recorded
        assert_eq!(snap.gauge(FILE_SIZE, &["snaproom-react", "first.log"]), Some(7.0));
        assert_eq!(snap.counter("snaproom_collector_cycles_total", &[]), Some(1.0));

        match result.into_result() {
            Err(CycleError::PartialFailure { failed, attempted, last }) => {
                assert_eq!((failed, attempted), (2, 2));
                assert_eq!(last.root(), Path::new("/logs"));
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
    }

    #[test]
    fn test_named_and_directory_passes_double_count_by_default() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("collector.log"), 64);

        let store = Arc::new(MetricsStore::new());
        let cycle = cycle_with(
            &store,
            Arc::new(WalkDirEnumerator::new()),
            Arc::new(FixedDeriver(1.0, Severity::Info)),
        )
        .with_sources([
            Source::service("collector", dir.path()),
            Source::directory(dir.path()),
        ]);

        assert_eq!(cycle.run_cycle().files, 2);
        assert_eq!(
            store.snapshot().counter(COLLECTED, &["collector", "info"]),
            Some(2.0)
        );
    }

    #[test]
    fn test_dedupe_skips_files_under_named_roots() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("react/app.log"), 5);
        write_file(&dir.path().join("stray.log"), 6);

        let store = Arc::new(MetricsStore::new());
        let cycle = cycle_with(
            &store,
            Arc::new(WalkDirEnumerator::new()),
            Arc::new(FixedDeriver(1.0, Severity::Debug)),
        )
        .with_sources([
            Source::service("snaproom-react", dir.path().join("react")),
            Source::directory(dir.path()),
        ])
        .with_dedupe(true);

        let result = cycle.run_cycle();
        assert_eq!(result.files, 2);

        let snap = store.snapshot();
        assert_eq!(snap.counter(COLLECTED, &["snaproom-react", "debug"]), Some(1.0));
        assert_eq!(snap.counter(COLLECTED, &["snaproom-react", "info"]), None);
        assert_eq!(snap.counter(COLLECTED, &["unknown", "info"]), Some(1.0));
    }

    #[test]
    fn test_dedupe_resolves_roots_through_the_enumerator() {
        let mut enumerator = MockSourceEnumerator::new();
        enumerator.expect_exists().return_const(true);
        // the service root is a link into the scanned directory
        enumerator
            .expect_canonical_root()
            .returning(|root| match root.to_str() {
                Some("/srv/app") => Some(PathBuf::from("/data/app")),
                _ => Some(root.to_path_buf()),
            });
        enumerator.expect_list_log_files().returning(|root| {
            let names: &[&str] = if root == Path::new("/srv/app") {
                &["a.log"]
            } else {
                &["app/a.log", "other.log"]
            };
            let files: Vec<_> = names
                .iter()
                .map(|name| {
                    let path = root.join(name);
                    Ok(LogFile {
                        file_name: path.file_name().unwrap().to_string_lossy().as_ref().into(),
                        size_bytes: 3,
                        path,
                    })
                })
                .collect();
            Box::new(files.into_iter())
        });

        let store = Arc::new(MetricsStore::new());
        let cycle = cycle_with(
            &store,
            Arc::new(enumerator),
            Arc::new(FixedDeriver(1.0, Severity::Warn)),
        )
        .with_sources([Source::service("svc", "/srv/app"), Source::directory("/data")])
        .with_dedupe(true);

        let result = cycle.run_cycle();
        assert_eq!(result.files, 2);

        let snap = store.snapshot();
        assert_eq!(snap.counter(COLLECTED, &["svc", "warn"]), Some(1.0));
        assert_eq!(snap.counter(COLLECTED, &["unknown", "info"]), Some(1.0));
        assert_eq!(snap.gauge(FILE_SIZE, &["unknown", "a.log"]), None);
    }
}
