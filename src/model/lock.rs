use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::model::ParseError;

/// A parsed Poetry lock file: the resolved package entries plus the
/// per-package file records from the `[metadata.files]` table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LockFile {
    #[serde(default, rename = "package")]
    pub packages: Vec<LockedPackage>,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
struct Metadata {
    #[serde(default)]
    files: BTreeMap<String, Vec<FileRecord>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,
    pub source: Option<PackageSource>,
}

/// A dependency constraint as Poetry writes it: a bare version string, a
/// table with optional markers, or a list of environment-scoped tables.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DependencySpec {
    Constraint(String),
    Detailed(DetailedSpec),
    Alternatives(Vec<DetailedSpec>),
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DetailedSpec {
    pub version: Option<String>,
    pub markers: Option<String>,
}

impl DependencySpec {
    /// Marker expressions gating this dependency. An empty result means the
    /// dependency applies unconditionally.
    pub fn markers(&self) -> Vec<&str> {
        match self {
            DependencySpec::Constraint(_) => Vec::new(),
            DependencySpec::Detailed(spec) => spec.markers.as_deref().into_iter().collect(),
            DependencySpec::Alternatives(specs) => {
                specs.iter().filter_map(|spec| spec.markers.as_deref()).collect()
            }
        }
    }

    /// True when at least one alternative carries no marker at all.
    pub fn has_unconditional_alternative(&self) -> bool {
        match self {
            DependencySpec::Constraint(_) => true,
            DependencySpec::Detailed(spec) => spec.markers.is_none(),
            DependencySpec::Alternatives(specs) => {
                specs.is_empty() || specs.iter().any(|spec| spec.markers.is_none())
            }
        }
    }
}

/// Presence means the package is built from an external source repository,
/// which this tool does not support.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PackageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub url: Option<String>,
    pub reference: Option<String>,
}

/// One distribution file of a package: filename plus algorithm-tagged hash.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub file: String,
    pub hash: String,
}

impl FileRecord {
    /// The bare sha256 digest, without the `sha256:` prefix.
    pub fn sha256(&self) -> Result<&str, ParseError> {
        self.hash
            .strip_prefix("sha256:")
            .ok_or_else(|| ParseError::UnsupportedHash {
                file: self.file.clone(),
                hash: self.hash.clone(),
            })
    }
}

impl LockFile {
    pub fn from_file(file: &Path) -> Result<LockFile, ParseError> {
        LockFile::from_str(&std::fs::read_to_string(file)?)
    }

    pub fn from_str(s: &str) -> Result<LockFile, ParseError> {
        toml::from_str(s).map_err(Into::into)
    }

    /// File records of a package, in lock file order.
    pub fn files(&self, package: &str) -> Result<&[FileRecord], ParseError> {
        self.metadata
            .files
            .get(package)
            .map(Vec::as_slice)
            .ok_or_else(|| ParseError::MissingFileRecords(package.to_owned()))
    }
}
