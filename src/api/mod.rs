use std::{error::Error, path::PathBuf};

use crate::{cli::command_handlers::do_generate, index::PypiIndex};

mod builder;

pub use builder::WheelfetchBuilder;

/// Entry point for driving a generation run programmatically.
pub struct Wheelfetch {
    root: PathBuf,
    lock_file_name: PathBuf,
    environment_file_name: PathBuf,
    output_directory_name: PathBuf,
    cache_directory: PathBuf,
    index_url: String,
    root_workspace: String,
    overrides: Vec<(String, String)>,
}

impl Wheelfetch {
    pub fn builder() -> WheelfetchBuilder {
        WheelfetchBuilder::default()
    }

    /// Resolves the lock file against the target environment and writes the
    /// generated `packages.bzl` and `requirements.bzl`.
    pub fn generate(&self) -> Result<(), Box<dyn Error>> {
        let index = PypiIndex::new(&self.index_url)?;
        do_generate(
            &self.root,
            &self.lock_file_name,
            &self.environment_file_name,
            &self.output_directory_name,
            self.cache_directory.clone(),
            &index,
            &self.root_workspace,
            &self.overrides,
        )
    }
}
