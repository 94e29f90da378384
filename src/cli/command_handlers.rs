use std::{
    error::Error,
    path::{Path, PathBuf},
};

use log::{info, warn};

use crate::{
    cache::UrlCache,
    index::PackageIndex,
    model::{environment::Environment, lock::LockFile},
    render,
    resolver::{self, LinkResolver},
};

const PACKAGES_FILE_NAME: &str = "packages.bzl";
const REQUIREMENTS_FILE_NAME: &str = "requirements.bzl";

/// Handler to the generate command: resolves every locked package and writes
/// the generated bzl files.
#[allow(clippy::too_many_arguments)]
pub fn do_generate<I: PackageIndex>(
    root: &Path,
    lock_file_name: &Path,
    environment_file_name: &Path,
    output_directory_name: &Path,
    cache_directory: PathBuf,
    index: &I,
    root_workspace: &str,
    overrides: &[(String, String)],
) -> Result<(), Box<dyn Error>> {
    let lock_file = LockFile::from_file(&root.join(lock_file_name))?;
    let environment = Environment::from_file(&root.join(environment_file_name))?;
    let tags = environment.compatible_tags();

    let mut cache = UrlCache::open(cache_directory)?;

    let result = {
        let mut links = LinkResolver::new(index, &mut cache);
        resolver::resolve_packages(&lock_file, &environment, &tags, root_workspace, &mut links)
    };

    // Urls discovered before a failure are valid regardless of it, so the
    // cache is persisted on both exit paths.
    let resolution = match result {
        Ok(resolution) => {
            cache.flush()?;
            resolution
        }
        Err(error) => {
            if let Err(flush_error) = cache.flush() {
                warn!("Failed to save the url cache: {flush_error}");
            }
            return Err(error.into());
        }
    };

    let labels = resolver::apply_overrides(resolution.labels, overrides);

    let output_directory = root.join(output_directory_name);
    std::fs::create_dir_all(&output_directory)?;

    let packages_path = output_directory.join(PACKAGES_FILE_NAME);
    std::fs::write(
        &packages_path,
        render::packages_bzl(&resolution.packages, &labels),
    )?;
    std::fs::write(
        output_directory.join(REQUIREMENTS_FILE_NAME),
        render::requirements_bzl(root_workspace),
    )?;

    info!(
        "Wrote build rules for {} packages to {}",
        resolution.packages.len(),
        packages_path.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use crate::index::{Digests, IndexError, ProjectMetadata, ReleaseFile};

    struct FakeIndex {
        projects: BTreeMap<String, ProjectMetadata>,
    }

    impl PackageIndex for FakeIndex {
        fn project_metadata(&self, package: &str) -> Result<ProjectMetadata, IndexError> {
            self.projects
                .get(package)
                .cloned()
                .ok_or_else(|| IndexError::NotFound(package.to_owned()))
        }
    }

    const LOCK: &str = r#"
[[package]]
name = "foo"
version = "1.0"

[package.dependencies]
bar = "*"

[[package]]
name = "bar"
version = "2.0"

[[package]]
name = "pinned"
version = "0.1"

[package.source]
type = "git"
url = "https://example.com/pinned.git"
reference = "deadbeef"

[metadata.files]
foo = [{ file = "foo-1.0-py3-none-any.whl", hash = "sha256:aa" }]
bar = [{ file = "bar-2.0.tar.gz", hash = "sha256:bb" }]
pinned = []
"#;

    const ENVIRONMENT: &str = r#"
[markers]
python_version = "3.8"

[interpreter]
major = 3
minor = 8
platforms = ["manylinux1_x86_64"]
"#;

    #[test]
    fn generates_bzl_files_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("poetry.lock"), LOCK).unwrap();
        std::fs::write(root.join("wheelfetch.toml"), ENVIRONMENT).unwrap();

        let index = FakeIndex {
            projects: BTreeMap::from([(
                "foo".to_owned(),
                ProjectMetadata {
                    releases: BTreeMap::from([(
                        "1.0".to_owned(),
                        vec![ReleaseFile {
                            filename: "foo-1.0-py3-none-any.whl".to_owned(),
                            url: "https://files.example.com/foo-1.0-py3-none-any.whl".to_owned(),
                            digests: Digests {
                                sha256: "aa".to_owned(),
                            },
                        }],
                    )]),
                },
            )]),
        };

        do_generate(
            root,
            Path::new("poetry.lock"),
            Path::new("wheelfetch.toml"),
            Path::new("out"),
            root.join("cache"),
            &index,
            "my_ws",
            &[("extra".to_owned(), "@vendored//extra".to_owned())],
        )
        .unwrap();

        let packages = std::fs::read_to_string(root.join("out/packages.bzl")).unwrap();
        // The wheel resolves through the index, the sdist url is derived.
        assert!(packages.contains("https://files.example.com/foo-1.0-py3-none-any.whl"));
        assert!(packages
            .contains("https://files.pythonhosted.org/packages/source/b/bar/bar-2.0.tar.gz"));
        assert!(packages.contains("\"foo\": \"@my_ws__foo-1.0\""));
        assert!(packages.contains("\"extra\": \"@vendored//extra\""));
        // The source-repository package is skipped, not rendered.
        assert!(!packages.contains("pinned"));

        let requirements = std::fs::read_to_string(root.join("out/requirements.bzl")).unwrap();
        assert!(requirements.contains("load(\"@my_ws//:packages.bzl\", \"pypi\")"));

        // The discovered wheel url was persisted for the next run.
        let cache = std::fs::read_to_string(root.join("cache/pypi_cache.json")).unwrap();
        assert!(cache.contains("\"aa\""));
    }
}
