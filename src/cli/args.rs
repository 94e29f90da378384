use std::path::PathBuf;

use clap::Parser;

/// Generates Bazel fetch rules from a Poetry lock file.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct CliArgs {
    /// Path to the Poetry lock file.
    #[arg(default_value = "poetry.lock")]
    pub lock_file: PathBuf,
    /// Name of the root Bazel workspace, prefixed to every generated label.
    #[arg(long)]
    pub root_workspace: String,
    /// Path to the target environment description toml.
    #[arg(short, long, default_value = "wheelfetch.toml")]
    pub environment: PathBuf,
    /// Directory the generated bzl files are written to.
    #[arg(short, long, default_value = ".")]
    pub output_directory: PathBuf,
    /// Location of the url cache directory.
    #[arg(long)]
    pub cache_directory: Option<PathBuf>,
    /// Base url of the package index JSON API.
    #[arg(long)]
    pub index_url: Option<String>,
    /// Explicit package-name=label mapping applied after resolution,
    /// replacing the resolved label. May be repeated.
    #[arg(long = "override-pkg", value_name = "NAME=LABEL", value_parser = parse_override)]
    pub overrides: Vec<(String, String)>,
}

fn parse_override(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, label)) if !name.is_empty() && !label.is_empty() => {
            Ok((name.to_owned(), label.to_owned()))
        }
        _ => Err(format!("expected NAME=LABEL, got `{value}`")),
    }
}
