use std::error::Error;

use clap::Parser;

use wheelfetch::{cli::args::CliArgs, Wheelfetch, WheelfetchConfig};

fn run() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();
    let config = WheelfetchConfig::load()?;

    let mut builder = Wheelfetch::builder()
        .lock_file_name(args.lock_file)
        .environment_file_name(args.environment)
        .output_directory_name(args.output_directory)
        .root_workspace(args.root_workspace)
        .overrides(args.overrides);

    if let Some(cache_directory) = args.cache_directory.or(config.cache_dir) {
        builder = builder.cache_directory(cache_directory);
    }
    if let Some(index_url) = args.index_url.or(config.index_url) {
        builder = builder.index_url(index_url);
    }

    builder.try_build()?.generate()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
