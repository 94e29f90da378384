use std::{env, error::Error, path::PathBuf};

use crate::{cache::UrlCache, index::DEFAULT_INDEX_URL, Wheelfetch};

#[derive(Default)]
pub struct WheelfetchBuilder {
    // All other paths are relative to `root`
    root: Option<PathBuf>,
    lock_file_name: Option<PathBuf>,
    environment_file_name: Option<PathBuf>,
    output_directory_name: Option<PathBuf>,
    cache_directory_path: Option<PathBuf>,
    index_url: Option<String>,
    root_workspace: Option<String>,
    overrides: Vec<(String, String)>,
}

impl WheelfetchBuilder {
    /// Project root directory.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Name of the Poetry lock file.
    ///
    /// Defaults to `poetry.lock`.
    pub fn lock_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file_name = Some(path.into());
        self
    }

    /// Name of the target environment description toml.
    ///
    /// Defaults to `wheelfetch.toml`.
    pub fn environment_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.environment_file_name = Some(path.into());
        self
    }

    /// Directory the generated bzl files are written to.
    ///
    /// Defaults to the project root.
    pub fn output_directory_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_directory_name = Some(path.into());
        self
    }

    /// Location of the url cache directory.
    ///
    /// Defaults to the per-user cache directory.
    pub fn cache_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_directory_path = Some(path.into());
        self
    }

    /// Base url of the package index JSON API.
    ///
    /// Defaults to the public PyPI endpoint.
    pub fn index_url(mut self, url: impl Into<String>) -> Self {
        self.index_url = Some(url.into());
        self
    }

    /// Name of the root Bazel workspace, prefixed to every generated label.
    pub fn root_workspace(mut self, name: impl Into<String>) -> Self {
        self.root_workspace = Some(name.into());
        self
    }

    /// Explicit package-name to label overrides applied after resolution.
    pub fn overrides(mut self, overrides: impl IntoIterator<Item = (String, String)>) -> Self {
        self.overrides.extend(overrides);
        self
    }

    pub fn try_build(self) -> Result<Wheelfetch, Box<dyn Error>> {
        let Self {
            root,
            lock_file_name,
            environment_file_name,
            output_directory_name,
            cache_directory_path,
            index_url,
            root_workspace,
            overrides,
        } = self;

        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };

        let root_workspace = root_workspace.ok_or("Root workspace name is not set")?;

        let lock_file_name = lock_file_name.unwrap_or_else(|| PathBuf::from("poetry.lock"));

        let environment_file_name =
            environment_file_name.unwrap_or_else(|| PathBuf::from("wheelfetch.toml"));

        let output_directory_name = output_directory_name.unwrap_or_else(|| PathBuf::from("."));

        let cache_directory = cache_directory_path.unwrap_or_else(UrlCache::default_location);

        let index_url = index_url.unwrap_or_else(|| DEFAULT_INDEX_URL.to_owned());

        Ok(Wheelfetch {
            root,
            lock_file_name,
            environment_file_name,
            output_directory_name,
            cache_directory,
            index_url,
            root_workspace,
            overrides,
        })
    }
}
