use std::io;
use thiserror::Error;

/// Problems reading the incidence dataset.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing column \"{column}\" (found {found:?})")]
    MissingColumn { column: String, found: Vec<String> },
    #[error("invalid record on line {line}")]
    InvalidRecord {
        line: usize,
        #[source]
        source: csv::Error,
    },
}

/// Problems with a category mapping table.
#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("could not parse category table: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("code \"{code}\" is listed under both \"{first}\" and \"{second}\"")]
    DuplicateCode {
        code: String,
        first: String,
        second: String,
    },
    #[error("group \"{0}\" has no codes")]
    EmptyGroup(String),
}
