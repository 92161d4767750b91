//! Firewall User-ID XML API
//!
//! Batches are rendered as a `uid-message` document and uploaded as a
//! multipart file to the active endpoint. Transport failures move on to the
//! next configured endpoint.

pub mod client;
pub mod message;
pub mod response;

pub use client::{Endpoint, EndpointSet, UidApiClient};
pub use message::render_uid_message;
pub use response::{parse_response, MappingFailure};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UidApiError {
    #[error("No User-ID API endpoints are configured")]
    NoEndpoints,
    #[error("Invalid endpoint URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP client error: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("User-ID mapping failed: {0}")]
    MappingFailure(MappingFailure),
    #[error("{count} User-ID mappings failed")]
    AggregateMappingFailure {
        failures: Vec<MappingFailure>,
        count: usize,
    },
    #[error("The User-ID API call failed: {message}")]
    ApiFailure { message: String, body: String },
}

impl UidApiError {
    /// Whether the call reached the API and only individual entries failed
    pub fn is_mapping_failure(&self) -> bool {
        matches!(
            self,
            UidApiError::MappingFailure(_) | UidApiError::AggregateMappingFailure { .. }
        )
    }

    pub fn mapping_failures(&self) -> &[MappingFailure] {
        match self {
            UidApiError::MappingFailure(failure) => std::slice::from_ref(failure),
            UidApiError::AggregateMappingFailure { failures, .. } => failures,
            _ => &[],
        }
    }
}
