use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SmokeError {
    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("data directory is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    #[error("failed to prepare data directory {0}")]
    DataDir(Utf8PathBuf),

    #[error("CMR request failed: {0}")]
    CatalogHttp(String),

    #[error("CMR returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("failed to parse CMR response: {0}")]
    CatalogParse(String),

    #[error("no collection found for DOI {0}")]
    #[diagnostic(help("check the DOI against https://search.earthdata.nasa.gov"))]
    CollectionNotFound(String),

    #[error("download request failed: {0}")]
    DownloadHttp(String),

    #[error("download returned status {status}")]
    DownloadStatus { status: u16, hint: Option<String> },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("command failed: {0}")]
    CommandFailed(String),

    #[error("failed to start Hyrax container: {0}")]
    #[diagnostic(help("is the docker daemon running and port 8080 free?"))]
    ServerStart(String),

    #[error("endpoint request failed: {0}")]
    EndpointHttp(String),

    #[error("endpoint returned status {0}")]
    EndpointStatus(u16),
}

impl SmokeError {
    /// Failures that end a run early but are reported, not propagated to the exit status.
    pub fn ends_run_early(&self) -> bool {
        matches!(
            self,
            SmokeError::CollectionNotFound(_) | SmokeError::ServerStart(_)
        )
    }
}
