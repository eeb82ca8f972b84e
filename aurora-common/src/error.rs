//! Errors raised while setting up an Aurora data folder

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The TOML configuration document did not parse
    #[error("Parse TOML failed: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Cannot create data folder {}: {source}", path.display())]
    DataFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
