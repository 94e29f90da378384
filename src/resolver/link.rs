use std::collections::HashMap;

use log::{debug, info};

use crate::{
    cache::UrlCache,
    index::{IndexError, PackageIndex, ProjectMetadata},
};

const SOURCE_URL_BASE: &str = "https://files.pythonhosted.org/packages/source";

/// Recovers download URLs for artifacts the lock file identifies only by
/// filename and content hash.
///
/// Wheel URLs are looked up on the package index and remembered in the
/// persistent cache keyed by sha256. Project metadata fetched on a cache miss
/// is additionally memoized for the run, so resolving several artifacts of
/// the same package costs at most one request.
pub struct LinkResolver<'a, I> {
    index: &'a I,
    cache: &'a mut UrlCache,
    metadata: HashMap<String, ProjectMetadata>,
}

impl<'a, I: PackageIndex> LinkResolver<'a, I> {
    pub fn new(index: &'a I, cache: &'a mut UrlCache) -> Self {
        Self {
            index,
            cache,
            metadata: HashMap::new(),
        }
    }

    /// Canonical URL of the wheel with the given digest, or `None` when the
    /// index knows the package but not this particular file.
    pub fn wheel_url(
        &mut self,
        package: &str,
        version: &str,
        sha256: &str,
    ) -> Result<Option<String>, IndexError> {
        if let Some(url) = self.cache.get(sha256) {
            debug!("Found {sha256} in the url cache");
            return Ok(Some(url.to_owned()));
        }

        if !self.metadata.contains_key(package) {
            let metadata = self.index.project_metadata(package)?;
            self.metadata.insert(package.to_owned(), metadata);
        }
        let metadata = &self.metadata[package];

        for (release_version, files) in &metadata.releases {
            if release_version != version {
                continue;
            }
            for file in files {
                if file.digests.sha256 != sha256 {
                    continue;
                }
                info!("Found {} at {}", file.filename, file.url);
                self.cache
                    .insert(file.digests.sha256.clone(), file.url.clone());
                return Ok(Some(file.url.clone()));
            }
        }

        Ok(None)
    }
}

/// Source archives follow the index's fixed naming convention and never need
/// a metadata lookup.
pub fn source_archive_url(package: &str, filename: &str) -> String {
    let first = package.chars().next().map(String::from).unwrap_or_default();
    format!("{SOURCE_URL_BASE}/{first}/{package}/{filename}")
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use crate::index::{Digests, ReleaseFile};

    /// Index stub that counts metadata requests.
    pub struct FakeIndex {
        pub projects: BTreeMap<String, ProjectMetadata>,
        pub requests: RefCell<Vec<String>>,
    }

    impl PackageIndex for FakeIndex {
        fn project_metadata(&self, package: &str) -> Result<ProjectMetadata, IndexError> {
            self.requests.borrow_mut().push(package.to_owned());
            self.projects
                .get(package)
                .cloned()
                .ok_or_else(|| IndexError::NotFound(package.to_owned()))
        }
    }

    pub fn release_file(filename: &str, sha256: &str) -> ReleaseFile {
        ReleaseFile {
            filename: filename.to_owned(),
            url: format!("https://files.example.com/{filename}"),
            digests: Digests {
                sha256: sha256.to_owned(),
            },
        }
    }

    fn fake_index() -> FakeIndex {
        FakeIndex {
            projects: BTreeMap::from([(
                "foo".to_owned(),
                ProjectMetadata {
                    releases: BTreeMap::from([
                        (
                            "1.0".to_owned(),
                            vec![
                                release_file("foo-1.0-py3-none-any.whl", "aa"),
                                release_file("foo-1.0.tar.gz", "bb"),
                            ],
                        ),
                        (
                            "0.9".to_owned(),
                            vec![release_file("foo-0.9-py3-none-any.whl", "cc")],
                        ),
                    ]),
                },
            )]),
            requests: RefCell::new(Vec::new()),
        }
    }

    fn cache() -> (tempfile::TempDir, UrlCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = UrlCache::open(dir.path().join("cache")).unwrap();
        (dir, cache)
    }

    #[test]
    fn resolves_and_caches_wheel_urls() {
        let index = fake_index();
        let (_dir, mut cache) = cache();
        let mut links = LinkResolver::new(&index, &mut cache);

        let url = links.wheel_url("foo", "1.0", "aa").unwrap();
        assert_eq!(
            url.as_deref(),
            Some("https://files.example.com/foo-1.0-py3-none-any.whl")
        );
        assert_eq!(index.requests.borrow().len(), 1);

        // Second resolution is served from the cache, no further request.
        let url = links.wheel_url("foo", "1.0", "aa").unwrap();
        assert!(url.is_some());
        assert_eq!(index.requests.borrow().len(), 1);
    }

    #[test]
    fn metadata_is_fetched_once_per_package() {
        let index = fake_index();
        let (_dir, mut cache) = cache();
        let mut links = LinkResolver::new(&index, &mut cache);

        links.wheel_url("foo", "1.0", "aa").unwrap();
        links.wheel_url("foo", "0.9", "cc").unwrap();
        assert_eq!(index.requests.borrow().len(), 1);
    }

    #[test]
    fn unknown_digest_is_a_negative_result() {
        let index = fake_index();
        let (_dir, mut cache) = cache();
        let mut links = LinkResolver::new(&index, &mut cache);

        assert_eq!(links.wheel_url("foo", "1.0", "zz").unwrap(), None);
    }

    #[test]
    fn unknown_package_is_an_error() {
        let index = fake_index();
        let (_dir, mut cache) = cache();
        let mut links = LinkResolver::new(&index, &mut cache);

        let error = links.wheel_url("missing", "1.0", "aa").unwrap_err();
        assert!(matches!(error, IndexError::NotFound(name) if name == "missing"));
    }

    #[test]
    fn source_urls_follow_the_index_convention() {
        assert_eq!(
            source_archive_url("foo", "foo-1.0.tar.gz"),
            "https://files.pythonhosted.org/packages/source/f/foo/foo-1.0.tar.gz"
        );
    }
}
