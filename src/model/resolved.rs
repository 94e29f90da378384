use std::collections::BTreeSet;

pub use crate::tags::ArtifactKind;

/// The artifact chosen for a package, with its recovered download location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub kind: ArtifactKind,
    pub file: String,
    pub sha256: String,
    pub url: String,
}

/// One fully resolved package, ready to be rendered as a build rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub artifact: ResolvedArtifact,
    /// Build-graph node label, e.g. `my_workspace__foo-1.0`.
    pub label: String,
    /// Declared dependencies that apply in the target environment.
    pub dependencies: BTreeSet<String>,
}
