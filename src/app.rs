use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cmr::CatalogClient;
use crate::config::RunConfig;
use crate::docker::ContainerRuntime;
use crate::domain::{CollectionConceptId, Doi, Granule, GranuleId, SortOrder};
use crate::error::SmokeError;
use crate::fetch::GranuleFetcher;
use crate::server::ServerGuard;
use crate::sidecar::SidecarGenerator;
use crate::verify::{EndpointCheck, EndpointProbe, verify_endpoints};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Resolve,
    Server,
    Locate,
    Download,
    Index,
    Verify,
    Teardown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Resolve => "Resolve",
            Phase::Server => "Server",
            Phase::Locate => "Locate",
            Phase::Download => "Download",
            Phase::Index => "Index",
            Phase::Verify => "Verify",
            Phase::Teardown => "Teardown",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    pub failed: bool,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn info(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            failed: false,
            elapsed: None,
        }
    }

    pub fn failure(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            failed: true,
            elapsed: None,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase={}; {}", self.phase, self.message)?;
        if let Some(elapsed) = self.elapsed {
            write!(f, " ({:.1}s)", elapsed.as_secs_f64())?;
        }
        Ok(())
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum GranuleOutcome {
    DownloadFailed { reason: String },
    MissingLocalFile,
    IndexFailed { reason: String },
    Verified { checks: Vec<EndpointCheck> },
}

impl GranuleOutcome {
    pub fn checks(&self) -> &[EndpointCheck] {
        match self {
            GranuleOutcome::Verified { checks } => checks,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GranuleReport {
    pub granule_id: GranuleId,
    pub title: String,
    pub filename: Option<String>,
    pub outcome: GranuleOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub doi: Doi,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub collection_id: Option<CollectionConceptId>,
    pub granules: Vec<GranuleReport>,
}

impl RunReport {
    fn new(doi: &Doi) -> Self {
        Self {
            doi: doi.clone(),
            started_at: Utc::now(),
            finished_at: None,
            collection_id: None,
            granules: Vec::new(),
        }
    }

    pub fn checks(&self) -> impl Iterator<Item = &EndpointCheck> {
        self.granules
            .iter()
            .flat_map(|granule| granule.outcome.checks())
    }

    pub fn failed_checks(&self) -> usize {
        self.checks().filter(|check| !check.passed()).count()
    }
}

/// Runs one smoke test: resolve, start Hyrax, then download, index and verify each granule.
pub struct App<C, F, R, P>
where
    C: CatalogClient,
    F: GranuleFetcher,
    R: ContainerRuntime,
    P: EndpointProbe,
{
    config: RunConfig,
    catalog: C,
    fetcher: F,
    runtime: R,
    probe: P,
}

impl<C, F, R, P> App<C, F, R, P>
where
    C: CatalogClient,
    F: GranuleFetcher,
    R: ContainerRuntime,
    P: EndpointProbe,
{
    pub fn new(config: RunConfig, catalog: C, fetcher: F, runtime: R, probe: P) -> Self {
        Self {
            config,
            catalog,
            fetcher,
            runtime,
            probe,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn run(&self, sink: &dyn ProgressSink) -> Result<RunReport, SmokeError> {
        let mut report = RunReport::new(&self.config.doi);
        self.config.ensure_data_dir()?;
        sink.event(ProgressEvent::info(
            Phase::Resolve,
            format!("using data directory {}", self.config.data_dir),
        ));

        let collection = self
            .resolve_collection(sink)
            .ok_or_else(|| SmokeError::CollectionNotFound(self.config.doi.to_string()))?;
        report.collection_id = Some(collection.clone());

        // dropping the guard tears the container down on every exit path below
        let mut server = ServerGuard::new(&self.runtime, self.config.server.clone(), sink);
        server.start()?;
        sink.event(ProgressEvent::info(Phase::Server, "container started"));

        let granules = self.locate_granules(&collection, sink);
        if granules.is_empty() {
            sink.event(ProgressEvent::failure(
                Phase::Locate,
                "no granules found to test",
            ));
        }

        for granule in &granules {
            report.granules.push(self.process_granule(granule, sink));
        }

        server.stop();
        report.finished_at = Some(Utc::now());
        Ok(report)
    }

    fn resolve_collection(&self, sink: &dyn ProgressSink) -> Option<CollectionConceptId> {
        let doi = &self.config.doi;
        sink.event(ProgressEvent::info(
            Phase::Resolve,
            format!("searching CMR for collection with DOI {doi}"),
        ));
        match self.catalog.find_collection(doi) {
            Ok(Some(id)) => {
                sink.event(ProgressEvent::info(
                    Phase::Resolve,
                    format!("found collection concept id {id}"),
                ));
                Some(id)
            }
            Ok(None) => {
                sink.event(ProgressEvent::failure(
                    Phase::Resolve,
                    format!("no collection found for DOI {doi}"),
                ));
                None
            }
            Err(err) => {
                sink.event(ProgressEvent::failure(
                    Phase::Resolve,
                    format!("collection search failed: {err}"),
                ));
                None
            }
        }
    }

    /// Earliest and latest granule, deduplicated by granule id.
    fn locate_granules(
        &self,
        collection: &CollectionConceptId,
        sink: &dyn ProgressSink,
    ) -> Vec<Granule> {
        let mut granules: Vec<Granule> = Vec::new();
        for order in [SortOrder::Ascending, SortOrder::Descending] {
            let Some(granule) = self.find_granule(collection, order, sink) else {
                continue;
            };
            if granules.iter().any(|known| known.id == granule.id) {
                sink.event(ProgressEvent::info(
                    Phase::Locate,
                    format!("{order} granule is the same as an earlier one; skipping"),
                ));
                continue;
            }
            granules.push(granule);
        }
        granules
    }

    fn find_granule(
        &self,
        collection: &CollectionConceptId,
        order: SortOrder,
        sink: &dyn ProgressSink,
    ) -> Option<Granule> {
        sink.event(ProgressEvent::info(
            Phase::Locate,
            format!(
                "searching {order} granule in {collection} (sort_key={})",
                order.sort_key()
            ),
        ));
        match self
            .catalog
            .find_granule(collection, order, &self.config.extension)
        {
            Ok(Some(granule)) => {
                sink.event(ProgressEvent::info(
                    Phase::Locate,
                    format!(
                        "found {} ({}) at {}",
                        granule.title, granule.id, granule.download_url
                    ),
                ));
                Some(granule)
            }
            Ok(None) => {
                sink.event(ProgressEvent::failure(
                    Phase::Locate,
                    format!(
                        "no {order} granule with an http(s) .{} link in {collection}",
                        self.config.extension
                    ),
                ));
                None
            }
            Err(err) => {
                sink.event(ProgressEvent::failure(
                    Phase::Locate,
                    format!("granule search failed: {err}"),
                ));
                None
            }
        }
    }

    fn process_granule(&self, granule: &Granule, sink: &dyn ProgressSink) -> GranuleReport {
        let filename = granule.filename();
        let outcome = match &filename {
            Some(filename) => self.download_index_verify(granule, filename, sink),
            None => {
                let reason = format!("no file name in {}", granule.download_url);
                sink.event(ProgressEvent::failure(Phase::Download, reason.clone()));
                GranuleOutcome::DownloadFailed { reason }
            }
        };
        GranuleReport {
            granule_id: granule.id.clone(),
            title: granule.title.clone(),
            filename,
            outcome,
        }
    }

    fn download_index_verify(
        &self,
        granule: &Granule,
        filename: &str,
        sink: &dyn ProgressSink,
    ) -> GranuleOutcome {
        let destination = self.config.data_dir.join(filename);
        sink.event(ProgressEvent::info(
            Phase::Download,
            format!("downloading {} to {destination}", granule.download_url),
        ));
        let started = Instant::now();
        match self
            .fetcher
            .download(&granule.download_url, destination.as_std_path())
        {
            Ok(bytes) => sink.event(
                ProgressEvent::info(Phase::Download, format!("downloaded {bytes} bytes"))
                    .with_elapsed(started.elapsed()),
            ),
            Err(err) => {
                let mut reason = err.to_string();
                if let SmokeError::DownloadStatus {
                    hint: Some(hint), ..
                } = &err
                {
                    reason = format!("{reason} ({hint})");
                }
                sink.event(ProgressEvent::failure(
                    Phase::Download,
                    format!("skipping {filename}: {reason}"),
                ));
                return GranuleOutcome::DownloadFailed { reason };
            }
        }

        if !destination.is_file() {
            sink.event(ProgressEvent::failure(
                Phase::Download,
                format!("skipping {filename}: {destination} is missing after download"),
            ));
            return GranuleOutcome::MissingLocalFile;
        }

        let spec = &self.config.server;
        sink.event(ProgressEvent::info(
            Phase::Index,
            format!("running gen_dmrpp_side_car for {filename}"),
        ));
        let generator = SidecarGenerator::new(&self.runtime, &spec.name, &spec.mount_point);
        if let Err(err) = generator.generate(filename) {
            sink.event(ProgressEvent::failure(
                Phase::Index,
                format!("sidecar generation failed for {filename}: {err}"),
            ));
            return GranuleOutcome::IndexFailed {
                reason: err.to_string(),
            };
        }

        let checks = verify_endpoints(
            &self.probe,
            &self.config.endpoint_host,
            spec.host_port,
            filename,
        );
        for check in &checks {
            let event = match &check.error {
                None => ProgressEvent::info(
                    Phase::Verify,
                    format!("{} {}: SUCCESS", check.label, check.url),
                ),
                Some(error) => ProgressEvent::failure(
                    Phase::Verify,
                    format!("{} {}: FAILED - {error}", check.label, check.url),
                ),
            };
            sink.event(event);
        }
        GranuleOutcome::Verified { checks }
    }
}
