use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, miette::Diagnostic)]
pub enum UploadError {
    #[error("failed to read {path}")]
    #[diagnostic(code(upload::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a directory")]
    #[diagnostic(code(upload::not_a_directory))]
    NotADirectory { path: PathBuf },

    #[error("API request failed: {0}")]
    #[diagnostic(code(upload::api))]
    Api(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    #[diagnostic(code(upload::api_status))]
    ApiStatus {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Kv(#[from] kv_assets::KvError),
}

pub type Result<T> = std::result::Result<T, UploadError>;
