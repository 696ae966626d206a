use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use camino::Utf8PathBuf;

use crate::domain::Doi;
use crate::error::SmokeError;
use crate::server::ServerSpec;

pub const DEFAULT_DOI: &str = "10.5067/MODIS/MCD12Q1.061";
pub const DEFAULT_DATA_DIR: &str = "hyrax_data";
pub const CMR_COLLECTIONS_URL: &str = "https://cmr.earthdata.nasa.gov/search/collections.json";
pub const CMR_GRANULES_URL: &str = "https://cmr.earthdata.nasa.gov/search/granules.json";
pub const HYRAX_CONTAINER_NAME: &str = "hyrax";
pub const HYRAX_IMAGE: &str = "opendap/hyrax:1.17.1-126";
pub const HYRAX_PORT: u16 = 8080;
pub const HYRAX_DATA_MOUNT: &str = "/usr/share/hyrax";
pub const GRANULE_EXTENSION: &str = "hdf";
pub const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(30);
/// Catalog searches block until CMR answers; only endpoint checks are time-bounded.
pub const CATALOG_TIMEOUT: Option<Duration> = None;

#[derive(Debug, Clone)]
pub struct CatalogEndpoints {
    pub collections_url: String,
    pub granules_url: String,
}

impl Default for CatalogEndpoints {
    fn default() -> Self {
        Self {
            collections_url: CMR_COLLECTIONS_URL.to_string(),
            granules_url: CMR_GRANULES_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub doi: Doi,
    pub data_dir: Utf8PathBuf,
    pub extension: String,
    pub server: ServerSpec,
    pub endpoint_host: String,
}

impl RunConfig {
    /// Builds the run configuration from the two CLI overrides, falling back to the
    /// built-in defaults.
    pub fn resolve(doi: Option<&str>, data_dir: Option<&str>) -> Result<Self, SmokeError> {
        let doi: Doi = doi.unwrap_or(DEFAULT_DOI).parse()?;
        let data_dir = match data_dir {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_DATA_DIR),
        };
        let data_dir = absolute_utf8(&data_dir)?;
        Ok(Self::with_data_dir(doi, data_dir))
    }

    pub fn with_data_dir(doi: Doi, data_dir: Utf8PathBuf) -> Self {
        let server = ServerSpec {
            name: HYRAX_CONTAINER_NAME.to_string(),
            image: HYRAX_IMAGE.to_string(),
            host_port: HYRAX_PORT,
            container_port: 8080,
            data_dir: data_dir.clone(),
            mount_point: HYRAX_DATA_MOUNT.to_string(),
        };
        Self {
            doi,
            data_dir,
            extension: GRANULE_EXTENSION.to_string(),
            server,
            endpoint_host: "localhost".to_string(),
        }
    }

    pub fn ensure_data_dir(&self) -> Result<(), SmokeError> {
        fs::create_dir_all(self.data_dir.as_std_path())
            .map_err(|_| SmokeError::DataDir(self.data_dir.clone()))
    }
}

/// Docker bind mounts need absolute host paths.
fn absolute_utf8(path: &Path) -> Result<Utf8PathBuf, SmokeError> {
    let absolute =
        std::path::absolute(path).map_err(|err| SmokeError::Filesystem(err.to_string()))?;
    Utf8PathBuf::from_path_buf(absolute)
        .map_err(|path| SmokeError::NonUtf8Path(path.display().to_string()))
}
