use crate::gateway_api::Endpoint;
use crate::registry::RegistryError;
use thiserror::Error;

/// Everything that can abort a poll cycle (or startup).
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("decoding response from {endpoint}: {message}; body: {body}")]
    Decode {
        endpoint: Endpoint,
        message: String,
        body: String,
    },
    #[error("gateway unreachable at {endpoint}: {source}")]
    UnreachableDevice {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint}: got status code {status}, want 200")]
    UnexpectedStatus {
        endpoint: Endpoint,
        status: reqwest::StatusCode,
    },
    #[error("version {raw:?} unexpected, want A.B.C")]
    MalformedVersion { raw: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type Result<T, E = ExporterError> = std::result::Result<T, E>;
