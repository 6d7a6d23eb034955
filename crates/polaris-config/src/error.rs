use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Settings file not found. Looked for:\n\
        - the POLARIS_CONFIG_PATH environment variable\n\
        - polaris.local.yaml, polaris.yaml in the current directory\n\
        - ~/.config/polaris/polaris.yaml"
    )]
    SettingsNotFound,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid settings in {path}: {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("No access token in {0}; set access_token or POLARIS_ACCESS_TOKEN")]
    MissingAccessToken(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
