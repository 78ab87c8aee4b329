//! Error taxonomy for probe initialization and sampling.

use std::io;
use thiserror::Error;

/// A probe's required setup failed. Fatal: the orchestrator aborts startup
/// and leaves no partially initialized state behind.
#[derive(Debug, Error)]
#[error("{domain} probe initialization failed")]
pub struct InitError {
    pub domain: &'static str,
    #[source]
    pub source: SampleError,
}

impl InitError {
    pub fn new(domain: &'static str, source: SampleError) -> Self {
        Self { domain, source }
    }
}

/// A single domain's read failed for one tick. Recovered at the orchestrator
/// boundary: the previous reading is retained and the tick continues.
///
/// A metric the platform simply does not expose is not a `SampleError`; it is
/// reported as the 0.0 sentinel.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to read {path}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("malformed data in {path}")]
    Parse { path: String },
}

impl SampleError {
    pub fn read(path: impl Into<String>, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<String>) -> Self {
        Self::Parse { path: path.into() }
    }
}
