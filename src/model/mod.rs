use thiserror::Error;

pub mod environment;
pub mod lock;
pub mod resolved;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading configuration toml: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Wheel filename `{0}` cannot be split into interpreter/abi/platform tags")]
    MalformedWheelFilename(String),
    #[error("File hash `{hash}` of `{file}` is not a sha256 digest")]
    UnsupportedHash { file: String, hash: String },
    #[error("No file records for package `{0}` in the lock file metadata")]
    MissingFileRecords(String),
}
