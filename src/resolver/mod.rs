mod link;

pub use link::{source_archive_url, LinkResolver};

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use thiserror::Error;

use crate::{
    index::{IndexError, PackageIndex},
    markers::{Marker, MarkerError},
    model::{
        environment::Environment,
        lock::{LockFile, LockedPackage},
        resolved::{ResolvedArtifact, ResolvedPackage},
        ParseError,
    },
    tags::{best_compatible_file, ArtifactKind, CompatibleTags},
};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Failed to evaluate marker `{marker}` of package `{package}`: {source}")]
    Marker {
        package: String,
        marker: String,
        source: MarkerError,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("Could not resolve an index url for `{file}` of package `{package}`")]
    UnresolvableWheel { package: String, file: String },
}

/// Outcome of one resolution pass: the packages that resolved, and the
/// package-name to build-label mapping used for dependency edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub packages: Vec<ResolvedPackage>,
    pub labels: BTreeMap<String, String>,
}

/// Resolves every locked package against the target environment: selects the
/// best-matching artifact, recovers its download URL and projects the
/// declared dependencies through their markers.
///
/// Packages built from a source repository and packages with no compatible
/// artifact are skipped with a diagnostic; everything else that fails here
/// aborts the whole pass.
pub fn resolve_packages<I: PackageIndex>(
    lock_file: &LockFile,
    environment: &Environment,
    tags: &CompatibleTags,
    root_workspace: &str,
    links: &mut LinkResolver<'_, I>,
) -> Result<Resolution, ResolveError> {
    let mut packages = Vec::new();
    let mut labels = BTreeMap::new();

    for package in &lock_file.packages {
        if let Some(source) = &package.source {
            warn!(
                "Cannot build {} {} from {} source {}, skipping",
                package.name,
                package.version,
                source.source_type,
                source.url.as_deref().unwrap_or("<unknown>"),
            );
            continue;
        }

        let files = lock_file.files(&package.name)?;
        let Some(selected) = best_compatible_file(files, tags)? else {
            // E.g. a Windows-only package resolved on Linux. If the package
            // is actually referenced the build will fail at analysis time.
            warn!(
                "Did not find a compatible file for {} {}",
                package.name, package.version
            );
            continue;
        };

        let sha256 = selected.file.sha256()?.to_owned();
        let url = match selected.kind {
            ArtifactKind::Wheel => links
                .wheel_url(&package.name, &package.version, &sha256)?
                .ok_or_else(|| ResolveError::UnresolvableWheel {
                    package: package.name.clone(),
                    file: selected.file.file.clone(),
                })?,
            ArtifactKind::Source => source_archive_url(&package.name, &selected.file.file),
        };

        let dependencies = applicable_dependencies(package, environment)?;
        debug!(
            "Resolved {} {} to {} with {} dependencies",
            package.name,
            package.version,
            selected.file.file,
            dependencies.len()
        );

        let label = format!("{root_workspace}__{}-{}", package.name, package.version);
        labels.insert(package.name.clone(), format!("@{label}"));
        packages.push(ResolvedPackage {
            name: package.name.clone(),
            version: package.version.clone(),
            artifact: ResolvedArtifact {
                kind: selected.kind,
                file: selected.file.file.clone(),
                sha256,
                url,
            },
            label,
            dependencies,
        });
    }

    Ok(Resolution { packages, labels })
}

/// The subset of a package's declared dependencies that apply in the target
/// environment. `extra` clauses are stripped before evaluation: a package in
/// the lock file is already part of the active closure, so the extras
/// selection has been made upstream.
fn applicable_dependencies(
    package: &LockedPackage,
    environment: &Environment,
) -> Result<BTreeSet<String>, ResolveError> {
    let mut dependencies = BTreeSet::new();

    'dependency: for (name, spec) in &package.dependencies {
        if spec.has_unconditional_alternative() {
            dependencies.insert(name.clone());
            continue;
        }
        for marker in spec.markers() {
            let parsed = Marker::parse(marker).map_err(|source| ResolveError::Marker {
                package: package.name.clone(),
                marker: marker.to_owned(),
                source,
            })?;
            let applies = match parsed.strip_extra() {
                None => true,
                Some(stripped) => stripped.evaluate(&environment.markers).map_err(|source| {
                    ResolveError::Marker {
                        package: package.name.clone(),
                        marker: marker.to_owned(),
                        source,
                    }
                })?,
            };
            if applies {
                dependencies.insert(name.clone());
                continue 'dependency;
            }
        }
    }

    Ok(dependencies)
}

/// Overlays caller-supplied name-to-label overrides on the resolver-derived
/// mapping; an override replaces any existing entry.
pub fn apply_overrides(
    mut labels: BTreeMap<String, String>,
    overrides: &[(String, String)],
) -> BTreeMap<String, String> {
    for (name, label) in overrides {
        labels.insert(name.clone(), label.clone());
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;

    use pretty_assertions::assert_eq;

    use crate::{
        cache::UrlCache,
        index::{Digests, ProjectMetadata, ReleaseFile},
    };

    struct FakeIndex {
        projects: BTreeMap<String, ProjectMetadata>,
        requests: RefCell<usize>,
    }

    impl PackageIndex for FakeIndex {
        fn project_metadata(&self, package: &str) -> Result<ProjectMetadata, IndexError> {
            *self.requests.borrow_mut() += 1;
            self.projects
                .get(package)
                .cloned()
                .ok_or_else(|| IndexError::NotFound(package.to_owned()))
        }
    }

    fn release_file(filename: &str, sha256: &str) -> ReleaseFile {
        ReleaseFile {
            filename: filename.to_owned(),
            url: format!("https://files.example.com/{filename}"),
            digests: Digests {
                sha256: sha256.to_owned(),
            },
        }
    }

    fn environment() -> Environment {
        Environment::from_str(
            r#"
[markers]
python_version = "3.8"
sys_platform = "linux"

[interpreter]
major = 3
minor = 8
platforms = ["manylinux1_x86_64"]
"#,
        )
        .unwrap()
    }

    fn index_with_foo() -> FakeIndex {
        FakeIndex {
            projects: BTreeMap::from([(
                "foo".to_owned(),
                ProjectMetadata {
                    releases: BTreeMap::from([(
                        "1.0".to_owned(),
                        vec![release_file("foo-1.0-py3-none-any.whl", "aa")],
                    )]),
                },
            )]),
            requests: RefCell::new(0),
        }
    }

    fn resolve(
        lock: &str,
        index: &FakeIndex,
        overrides: &[(String, String)],
    ) -> Result<Resolution, ResolveError> {
        let lock_file = LockFile::from_str(lock).unwrap();
        let environment = environment();
        let tags = environment.compatible_tags();
        let dir = tempfile::tempdir().unwrap();
        let mut cache = UrlCache::open(dir.path().join("cache")).unwrap();
        let mut links = LinkResolver::new(index, &mut cache);
        let mut resolution =
            resolve_packages(&lock_file, &environment, &tags, "my_ws", &mut links)?;
        resolution.labels = apply_overrides(std::mem::take(&mut resolution.labels), overrides);
        Ok(resolution)
    }

    #[test]
    fn resolves_wheel_with_dependencies() {
        let index = index_with_foo();
        let resolution = resolve(
            r#"
[[package]]
name = "foo"
version = "1.0"

[package.dependencies]
bar = "*"

[metadata.files]
foo = [{ file = "foo-1.0-py3-none-any.whl", hash = "sha256:aa" }]
"#,
            &index,
            &[],
        )
        .unwrap();

        assert_eq!(resolution.packages.len(), 1);
        let foo = &resolution.packages[0];
        assert_eq!(foo.artifact.kind, ArtifactKind::Wheel);
        assert_eq!(foo.artifact.sha256, "aa");
        assert_eq!(foo.label, "my_ws__foo-1.0");
        assert_eq!(
            foo.dependencies,
            BTreeSet::from(["bar".to_owned()])
        );
        assert_eq!(
            resolution.labels,
            BTreeMap::from([("foo".to_owned(), "@my_ws__foo-1.0".to_owned())])
        );
    }

    #[test]
    fn marker_projection_excludes_inapplicable_dependencies() {
        let index = index_with_foo();
        let resolution = resolve(
            r#"
[[package]]
name = "foo"
version = "1.0"

[package.dependencies]
wincompat = { version = "1.0", markers = "sys_platform == \"win32\"" }
modern = { version = "1.0", markers = "python_version >= \"3.6\" and extra == \"full\"" }

[metadata.files]
foo = [{ file = "foo-1.0-py3-none-any.whl", hash = "sha256:aa" }]
"#,
            &index,
            &[],
        )
        .unwrap();

        assert_eq!(
            resolution.packages[0].dependencies,
            BTreeSet::from(["modern".to_owned()])
        );
    }

    #[test]
    fn undefined_marker_variable_names_the_package() {
        let index = index_with_foo();
        let error = resolve(
            r#"
[[package]]
name = "foo"
version = "1.0"

[package.dependencies]
bar = { version = "1.0", markers = "platform_machine == \"x86_64\"" }

[metadata.files]
foo = [{ file = "foo-1.0-py3-none-any.whl", hash = "sha256:aa" }]
"#,
            &index,
            &[],
        )
        .unwrap_err();

        match error {
            ResolveError::Marker { package, source, .. } => {
                assert_eq!(package, "foo");
                assert!(matches!(source, MarkerError::UndefinedVariable(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn source_repository_packages_are_skipped() {
        let index = index_with_foo();
        let resolution = resolve(
            r#"
[[package]]
name = "pinned"
version = "0.1"

[package.source]
type = "git"
url = "https://example.com/pinned.git"
reference = "deadbeef"

[metadata.files]
pinned = []
"#,
            &index,
            &[],
        )
        .unwrap();

        assert_eq!(resolution.packages, Vec::new());
        assert_eq!(resolution.labels, BTreeMap::new());
        assert_eq!(*index.requests.borrow(), 0);
    }

    #[test]
    fn incompatible_packages_are_skipped() {
        let index = index_with_foo();
        let resolution = resolve(
            r#"
[[package]]
name = "winonly"
version = "2.0"

[metadata.files]
winonly = [{ file = "winonly-2.0-cp38-cp38-win_amd64.whl", hash = "sha256:dd" }]
"#,
            &index,
            &[],
        )
        .unwrap();

        assert_eq!(resolution.packages, Vec::new());
    }

    #[test]
    fn source_archives_use_the_derived_url() {
        let index = index_with_foo();
        let resolution = resolve(
            r#"
[[package]]
name = "srcpkg"
version = "0.3"

[metadata.files]
srcpkg = [{ file = "srcpkg-0.3.tar.gz", hash = "sha256:ee" }]
"#,
            &index,
            &[],
        )
        .unwrap();

        let srcpkg = &resolution.packages[0];
        assert_eq!(srcpkg.artifact.kind, ArtifactKind::Source);
        assert_eq!(
            srcpkg.artifact.url,
            "https://files.pythonhosted.org/packages/source/s/srcpkg/srcpkg-0.3.tar.gz"
        );
        // The deterministic url never touches the index.
        assert_eq!(*index.requests.borrow(), 0);
    }

    #[test]
    fn unresolvable_wheel_hash_is_fatal() {
        let index = index_with_foo();
        let error = resolve(
            r#"
[[package]]
name = "foo"
version = "1.0"

[metadata.files]
foo = [{ file = "foo-1.0-py3-none-any.whl", hash = "sha256:not-on-the-index" }]
"#,
            &index,
            &[],
        )
        .unwrap_err();

        assert!(matches!(error, ResolveError::UnresolvableWheel { .. }));
    }

    #[test]
    fn missing_file_records_are_fatal() {
        let index = index_with_foo();
        let error = resolve(
            r#"
[[package]]
name = "foo"
version = "1.0"
"#,
            &index,
            &[],
        )
        .unwrap_err();

        assert!(matches!(
            error,
            ResolveError::Parse(ParseError::MissingFileRecords(_))
        ));
    }

    #[test]
    fn overrides_replace_resolved_labels() {
        let labels = BTreeMap::from([
            ("foo".to_owned(), "@my_ws__foo-1.0".to_owned()),
            ("bar".to_owned(), "@my_ws__bar-2.0".to_owned()),
        ]);
        let overrides = vec![
            ("foo".to_owned(), "@vendored//foo".to_owned()),
            ("baz".to_owned(), "@vendored//baz".to_owned()),
        ];
        let merged = apply_overrides(labels, &overrides);
        assert_eq!(
            merged,
            BTreeMap::from([
                ("foo".to_owned(), "@vendored//foo".to_owned()),
                ("bar".to_owned(), "@my_ws__bar-2.0".to_owned()),
                ("baz".to_owned(), "@vendored//baz".to_owned()),
            ])
        );
    }

    #[test]
    fn tag_ranking_prefers_the_more_specific_wheel() {
        let mut index = index_with_foo();
        index.projects.insert(
            "fast".to_owned(),
            ProjectMetadata {
                releases: BTreeMap::from([(
                    "1.0".to_owned(),
                    vec![
                        release_file("fast-1.0-py3-none-any.whl", "11"),
                        release_file("fast-1.0-cp38-cp38-manylinux1_x86_64.whl", "22"),
                    ],
                )]),
            },
        );
        let resolution = resolve(
            r#"
[[package]]
name = "fast"
version = "1.0"

[metadata.files]
fast = [
    { file = "fast-1.0-py3-none-any.whl", hash = "sha256:11" },
    { file = "fast-1.0-cp38-cp38-manylinux1_x86_64.whl", hash = "sha256:22" },
]
"#,
            &index,
            &[],
        )
        .unwrap();

        assert_eq!(
            resolution.packages[0].artifact.file,
            "fast-1.0-cp38-cp38-manylinux1_x86_64.whl"
        );
    }
}
