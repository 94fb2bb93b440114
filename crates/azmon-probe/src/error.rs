//! Probe pipeline errors.

use azmon_client::ClientError;
use thiserror::Error;

/// A failure that aborts a probe phase.
///
/// Per-resource metric errors are not represented here; they are logged and
/// the resource is skipped.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("error querying resource graph: {0}")]
    Structural(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("error get metrics client for region {region}: {source}")]
    ClientConstruction {
        region: String,
        #[source]
        source: ClientError,
    },
}

pub type ProbeResult<T> = Result<T, ProbeError>;
