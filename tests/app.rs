use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use dmrpp_smoke::app::{App, GranuleOutcome, ProgressEvent, ProgressSink};
use dmrpp_smoke::cmr::CatalogClient;
use dmrpp_smoke::config::RunConfig;
use dmrpp_smoke::docker::ContainerRuntime;
use dmrpp_smoke::domain::{CollectionConceptId, Doi, Granule, GranuleId, SortOrder};
use dmrpp_smoke::error::SmokeError;
use dmrpp_smoke::fetch::GranuleFetcher;
use dmrpp_smoke::verify::EndpointProbe;

type Calls = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct MockCatalog {
    collection: Option<&'static str>,
    collection_error: bool,
    earliest: Option<Granule>,
    latest: Option<Granule>,
    panic_on_locate: bool,
}

impl CatalogClient for MockCatalog {
    fn find_collection(&self, _doi: &Doi) -> Result<Option<CollectionConceptId>, SmokeError> {
        if self.collection_error {
            return Err(SmokeError::CatalogStatus {
                status: 500,
                message: "internal error".to_string(),
            });
        }
        Ok(self.collection.map(CollectionConceptId::new))
    }

    fn find_granule(
        &self,
        _collection: &CollectionConceptId,
        order: SortOrder,
        _extension: &str,
    ) -> Result<Option<Granule>, SmokeError> {
        if self.panic_on_locate {
            panic!("simulated failure while locating granules");
        }
        Ok(match order {
            SortOrder::Ascending => self.earliest.clone(),
            SortOrder::Descending => self.latest.clone(),
        })
    }
}

struct MockFetcher {
    calls: Calls,
    failing: HashSet<String>,
    panic: bool,
}

impl GranuleFetcher for MockFetcher {
    fn download(&self, url: &str, destination: &Path) -> Result<u64, SmokeError> {
        if self.panic {
            panic!("simulated failure while downloading");
        }
        self.calls.lock().unwrap().push(format!("download {url}"));
        if self.failing.contains(url) {
            return Err(SmokeError::DownloadStatus {
                status: 502,
                hint: Some("login required".to_string()),
            });
        }
        std::fs::write(destination, b"HDF").unwrap();
        Ok(3)
    }
}

struct MockRuntime {
    calls: Calls,
    fail_run: bool,
    fail_exec: HashSet<String>,
    panic_exec: bool,
}

impl ContainerRuntime for MockRuntime {
    fn remove(&self, name: &str) -> Result<(), SmokeError> {
        self.calls.lock().unwrap().push(format!("rm {name}"));
        Ok(())
    }

    fn run(&self, args: &[String]) -> Result<(), SmokeError> {
        self.calls.lock().unwrap().push(format!("run {}", args.join(" ")));
        if self.fail_run {
            return Err(SmokeError::CommandFailed("port is already allocated".to_string()));
        }
        Ok(())
    }

    fn exec(&self, name: &str, workdir: &str, command: &[String]) -> Result<(), SmokeError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("exec {name} {workdir} {}", command.join(" ")));
        if self.panic_exec {
            panic!("simulated failure while indexing");
        }
        if command.iter().any(|arg| self.fail_exec.contains(arg)) {
            return Err(SmokeError::CommandFailed("gen_dmrpp_side_car: bad file".to_string()));
        }
        Ok(())
    }
}

struct MockProbe {
    calls: Calls,
    failing_suffix: Option<&'static str>,
    panic: bool,
}

impl EndpointProbe for MockProbe {
    fn probe(&self, url: &str) -> Result<u16, SmokeError> {
        if self.panic {
            panic!("simulated failure while verifying");
        }
        self.calls.lock().unwrap().push(format!("probe {url}"));
        match self.failing_suffix {
            Some(suffix) if url.ends_with(suffix) => Err(SmokeError::EndpointStatus(404)),
            _ => Ok(200),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct Harness {
    calls: Calls,
    _temp: tempfile::TempDir,
    app: App<MockCatalog, MockFetcher, MockRuntime, MockProbe>,
}

#[derive(Default)]
struct Failures {
    download: HashSet<String>,
    index: HashSet<String>,
    run: bool,
    endpoint_suffix: Option<&'static str>,
    panic_download: bool,
    panic_index: bool,
    panic_verify: bool,
}

fn granule(id: &str, file: &str) -> Granule {
    Granule {
        title: format!("{file} title"),
        id: GranuleId::new(id),
        download_url: format!("https://data.example.org/MCD12Q1/{file}"),
        collection_id: CollectionConceptId::new("C123"),
    }
}

fn harness(catalog: MockCatalog, failures: Failures) -> Harness {
    let temp = tempfile::tempdir().unwrap();
    let data_dir = Utf8PathBuf::from_path_buf(temp.path().join("hyrax_data")).unwrap();
    let doi: Doi = "10.5067/MODIS/MCD12Q1.061".parse().unwrap();
    let config = RunConfig::with_data_dir(doi, data_dir);
    let calls: Calls = Arc::default();
    let fetcher = MockFetcher {
        calls: calls.clone(),
        failing: failures.download,
        panic: failures.panic_download,
    };
    let runtime = MockRuntime {
        calls: calls.clone(),
        fail_run: failures.run,
        fail_exec: failures.index,
        panic_exec: failures.panic_index,
    };
    let probe = MockProbe {
        calls: calls.clone(),
        failing_suffix: failures.endpoint_suffix,
        panic: failures.panic_verify,
    };
    Harness {
        calls,
        _temp: temp,
        app: App::new(config, catalog, fetcher, runtime, probe),
    }
}

fn two_granules() -> MockCatalog {
    MockCatalog {
        collection: Some("C123"),
        earliest: Some(granule("G1", "first.hdf")),
        latest: Some(granule("G2", "last.hdf")),
        ..MockCatalog::default()
    }
}

fn recorded(harness: &Harness) -> Vec<String> {
    harness.calls.lock().unwrap().clone()
}

/// Container removals issued after `docker run`, i.e. teardowns.
fn teardowns(calls: &[String]) -> usize {
    let Some(run_at) = calls.iter().position(|call| call.starts_with("run ")) else {
        return 0;
    };
    calls[run_at..]
        .iter()
        .filter(|call| *call == "rm hyrax")
        .count()
}

#[test]
fn unknown_doi_never_starts_server() {
    let harness = harness(MockCatalog::default(), Failures::default());
    let sink = RecordingSink::default();

    let err = harness.app.run(&sink).unwrap_err();

    assert_matches!(err, SmokeError::CollectionNotFound(_));
    assert!(recorded(&harness).is_empty());
}

#[test]
fn collection_search_error_counts_as_not_found() {
    let catalog = MockCatalog {
        collection_error: true,
        ..MockCatalog::default()
    };
    let harness = harness(catalog, Failures::default());
    let sink = RecordingSink::default();

    let err = harness.app.run(&sink).unwrap_err();

    assert_matches!(err, SmokeError::CollectionNotFound(_));
    assert!(recorded(&harness).is_empty());
    assert!(sink.events.lock().unwrap().iter().any(|event| event.failed));
}

#[test]
fn two_granules_are_downloaded_indexed_and_verified() {
    let harness = harness(two_granules(), Failures::default());
    let sink = RecordingSink::default();

    let report = harness.app.run(&sink).unwrap();

    assert_eq!(report.collection_id, Some(CollectionConceptId::new("C123")));
    assert_eq!(report.granules.len(), 2);
    for granule in &report.granules {
        assert_matches!(&granule.outcome, GranuleOutcome::Verified { checks } if checks.len() == 4);
    }
    assert_eq!(report.failed_checks(), 0);
    assert!(report.finished_at.is_some());

    let calls = recorded(&harness);
    let data_dir = &harness.app.config().data_dir;
    assert_eq!(calls[0], "rm hyrax");
    assert_eq!(
        calls[1],
        format!(
            "run -d -h hyrax -p 8080:8080 -v {data_dir}:/usr/share/hyrax \
             --name hyrax opendap/hyrax:1.17.1-126"
        )
    );
    assert_eq!(
        calls[2],
        "download https://data.example.org/MCD12Q1/first.hdf"
    );
    assert_eq!(
        calls[3],
        "exec hyrax /usr/share/hyrax gen_dmrpp_side_car -i first.hdf -H -U"
    );
    assert_eq!(calls[4], "probe http://localhost:8080/opendap/first.hdf.dmr");
    assert_eq!(
        calls[7],
        "probe http://localhost:8080/opendap/first.hdf.dmrpp.html"
    );
    assert_eq!(calls[8], "download https://data.example.org/MCD12Q1/last.hdf");
    assert_eq!(calls.last().unwrap(), "rm hyrax");
    assert_eq!(teardowns(&calls), 1);
    assert!(data_dir.join("first.hdf").is_file());
    assert!(data_dir.join("last.hdf").is_file());
}

#[test]
fn identical_earliest_and_latest_granule_is_processed_once() {
    let catalog = MockCatalog {
        collection: Some("C123"),
        earliest: Some(granule("G1", "only.hdf")),
        latest: Some(granule("G1", "only.hdf")),
        ..MockCatalog::default()
    };
    let harness = harness(catalog, Failures::default());

    let report = harness.app.run(&RecordingSink::default()).unwrap();

    assert_eq!(report.granules.len(), 1);
    let downloads = recorded(&harness)
        .iter()
        .filter(|call| call.starts_with("download "))
        .count();
    assert_eq!(downloads, 1);
}

#[test]
fn no_granules_tears_down_without_downloading() {
    let catalog = MockCatalog {
        collection: Some("C123"),
        ..MockCatalog::default()
    };
    let harness = harness(catalog, Failures::default());

    let report = harness.app.run(&RecordingSink::default()).unwrap();

    assert!(report.granules.is_empty());
    let calls = recorded(&harness);
    assert!(!calls.iter().any(|call| call.starts_with("download ")));
    assert_eq!(teardowns(&calls), 1);
}

#[test]
fn download_failure_skips_only_that_granule() {
    let failures = Failures {
        download: HashSet::from(["https://data.example.org/MCD12Q1/first.hdf".to_string()]),
        ..Failures::default()
    };
    let harness = harness(two_granules(), failures);

    let report = harness.app.run(&RecordingSink::default()).unwrap();

    assert_matches!(
        &report.granules[0].outcome,
        GranuleOutcome::DownloadFailed { reason } if reason.contains("502")
    );
    assert_matches!(
        &report.granules[1].outcome,
        GranuleOutcome::Verified { checks } if checks.len() == 4
    );
    let calls = recorded(&harness);
    assert!(!calls.iter().any(|call| {
        (call.starts_with("exec ") || call.starts_with("probe ")) && call.contains("first.hdf")
    }));
    assert!(calls.iter().any(|call| call.starts_with("exec ") && call.contains("last.hdf")));
    assert_eq!(teardowns(&calls), 1);
}

#[test]
fn index_failure_skips_verification_of_that_granule() {
    let failures = Failures {
        index: HashSet::from(["first.hdf".to_string()]),
        ..Failures::default()
    };
    let harness = harness(two_granules(), failures);

    let report = harness.app.run(&RecordingSink::default()).unwrap();

    assert_matches!(&report.granules[0].outcome, GranuleOutcome::IndexFailed { .. });
    assert_eq!(report.granules[1].outcome.checks().len(), 4);
    let calls = recorded(&harness);
    assert!(!calls.iter().any(|call| call.starts_with("probe ") && call.contains("first.hdf")));
    assert_eq!(teardowns(&calls), 1);
}

#[test]
fn failing_endpoint_does_not_stop_other_checks() {
    let failures = Failures {
        endpoint_suffix: Some(".dmrpp"),
        ..Failures::default()
    };
    let harness = harness(two_granules(), failures);

    let report = harness.app.run(&RecordingSink::default()).unwrap();

    assert_eq!(report.checks().count(), 8);
    assert_eq!(report.failed_checks(), 2);
    let failed = report.granules[0]
        .outcome
        .checks()
        .iter()
        .find(|check| !check.passed())
        .unwrap();
    assert_eq!(failed.label, "DMR++ (XML)");
    assert_eq!(failed.status, Some(404));
}

#[test]
fn server_start_failure_aborts_after_teardown() {
    let failures = Failures {
        run: true,
        ..Failures::default()
    };
    let harness = harness(two_granules(), failures);

    let err = harness.app.run(&RecordingSink::default()).unwrap_err();

    assert_matches!(err, SmokeError::ServerStart(_));
    let calls = recorded(&harness);
    assert!(!calls.iter().any(|call| call.starts_with("download ")));
    assert_eq!(teardowns(&calls), 1);
}

#[test]
fn panic_while_locating_still_tears_down() {
    let catalog = MockCatalog {
        panic_on_locate: true,
        ..two_granules()
    };
    let harness = harness(catalog, Failures::default());
    let sink = RecordingSink::default();

    let result = catch_unwind(AssertUnwindSafe(|| harness.app.run(&sink)));

    assert!(result.is_err());
    assert_eq!(teardowns(&recorded(&harness)), 1);
}

#[test]
fn panic_while_downloading_still_tears_down() {
    let failures = Failures {
        panic_download: true,
        ..Failures::default()
    };
    let harness = harness(two_granules(), failures);
    let sink = RecordingSink::default();

    let result = catch_unwind(AssertUnwindSafe(|| harness.app.run(&sink)));

    assert!(result.is_err());
    assert_eq!(teardowns(&recorded(&harness)), 1);
}

#[test]
fn panic_while_verifying_still_tears_down() {
    let failures = Failures {
        panic_verify: true,
        ..Failures::default()
    };
    let harness = harness(two_granules(), failures);
    let sink = RecordingSink::default();

    let result = catch_unwind(AssertUnwindSafe(|| harness.app.run(&sink)));

    assert!(result.is_err());
    let calls = recorded(&harness);
    assert!(calls.iter().any(|call| call.starts_with("exec ")));
    assert_eq!(teardowns(&calls), 1);
}

#[test]
fn panic_while_indexing_still_tears_down() {
    let failures = Failures {
        panic_index: true,
        ..Failures::default()
    };
    let harness = harness(two_granules(), failures);
    let sink = RecordingSink::default();

    let result = catch_unwind(AssertUnwindSafe(|| harness.app.run(&sink)));

    assert!(result.is_err());
    let calls = recorded(&harness);
    assert!(calls.iter().any(|call| call.starts_with("download ")));
    assert!(!calls.iter().any(|call| call.starts_with("probe ")));
    assert_eq!(teardowns(&calls), 1);
}
