use std::collections::BTreeMap;
use std::time::Duration;

use log::trace;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/pypi";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Package `{0}` does not exist on the package index")]
    NotFound(String),
    #[error("Failed to get index metadata for `{package}` with http status {status}")]
    Status { package: String, status: StatusCode },
    #[error("Index request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Per-project metadata as served by the PyPI JSON API: every released
/// version with its downloadable files.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProjectMetadata {
    pub releases: BTreeMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReleaseFile {
    pub filename: String,
    pub url: String,
    pub digests: Digests,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Digests {
    pub sha256: String,
}

/// The remote package index, as a seam so resolution can be tested without
/// a network.
pub trait PackageIndex {
    fn project_metadata(&self, package: &str) -> Result<ProjectMetadata, IndexError>;
}

/// PyPI JSON API client.
pub struct PypiIndex {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl PypiIndex {
    pub fn new(base_url: impl Into<String>) -> Result<PypiIndex, IndexError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(PypiIndex {
            client,
            base_url: base_url.into(),
        })
    }
}

impl PackageIndex for PypiIndex {
    fn project_metadata(&self, package: &str) -> Result<ProjectMetadata, IndexError> {
        let url = format!("{}/{}/json", self.base_url.trim_end_matches('/'), package);
        trace!("Fetching package metadata from {url}");

        let response = self.client.get(&url).send()?;
        match response.status() {
            StatusCode::OK => Ok(response.json()?),
            StatusCode::NOT_FOUND => Err(IndexError::NotFound(package.to_owned())),
            status => Err(IndexError::Status {
                package: package.to_owned(),
                status,
            }),
        }
    }
}
