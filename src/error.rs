//! Error types shared by the migration pipeline.
//!
//! `DecodeError` is fatal to a run. Everything else is scoped to a single
//! article and ends up as the reason of a failed `MigrationOutcome`.
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// The export document could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read export: {0}")]
    Io(#[from] std::io::Error),
    #[error("export JSON does not match the expected schema: {0}")]
    Json(#[from] serde_json::Error),
}

/// A call to the destination wiki failed.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{operation}: request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation}: HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("{operation}: rejected by wiki: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },
    #[error("{operation}: response has no `{field}`")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
    #[error("{operation}: invalid response JSON: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{operation}: cannot read {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An embedded image could not be downloaded into a local artifact.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url}: cannot derive a file name from URL")]
    InvalidUrl { url: String },
    #[error("{url}: request failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url}: HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("{}: cannot write artifact: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why one article's migration ended in the failed state.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("{path}: invalid page path")]
    InvalidPath { path: String },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}
