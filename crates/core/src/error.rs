use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid bundle catalog: {0}")]
    Catalog(String),

    #[error("No bundle target for group '{0}'")]
    UnmappedGroup(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
