use std::path::PathBuf;
use std::time::Duration;

/// Errors produced while provisioning or talking to the engine.
///
/// Provisioning errors (directory creation, version lookup, download,
/// verification, spawn) are fatal to [`Bridge`](crate::Bridge) construction.
/// Request-time errors (`Io`, `StreamClosed`, `Terminated`, `Timeout`, `Json`)
/// are absorbed by [`Bridge::request`](crate::Bridge::request) and never reach
/// its callers.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    // -------------------------------------------------------------------------
    // Provisioning
    // -------------------------------------------------------------------------
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read binary directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to get latest version from {url}: {source}")]
    VersionRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("version request to {url} failed with status: {status}")]
    VersionStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("update server returned an unusable version string: '{0}'")]
    InvalidVersion(String),

    #[error("failed to download binary from {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download request for {url} failed with status: {status}")]
    DownloadStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("checksum mismatch for {url}. Expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("failed to install binary to {path}: {source}")]
    Install {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to spawn engine {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Request time
    // -------------------------------------------------------------------------
    #[error("engine pipe I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine closed its output stream")]
    StreamClosed,

    #[error("engine process has been terminated")]
    Terminated,

    #[error("engine did not answer within {0:?}")]
    Timeout(Duration),

    #[error("malformed engine response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request payload contains a line break")]
    PayloadLineBreak,

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    pub fn is_checksum_mismatch(&self) -> bool {
        matches!(self, BridgeError::ChecksumMismatch { .. })
    }

    /// Whether the error leaves the pipe channel unusable.
    ///
    /// A JSON error only means one bad line; everything else on the request
    /// path means the stream is broken or out of step.
    pub fn breaks_channel(&self) -> bool {
        matches!(
            self,
            BridgeError::Io(_)
                | BridgeError::StreamClosed
                | BridgeError::Terminated
                | BridgeError::Timeout(_)
        )
    }
}
