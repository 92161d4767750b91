use super::{parse_response, render_uid_message, UidApiError};
use crate::batch::BatchMessage;
use crate::config::{ApiEndpointConfig, UidApiConfig};
use reqwest::multipart::{Form, Part};
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// A single firewall API endpoint
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: Url,
    api_key: String,
    url_encode_key: bool,
}

impl Endpoint {
    pub fn new(url: &str, api_key: impl Into<String>, url_encode_key: bool) -> Result<Self, UidApiError> {
        let url = Url::parse(url).map_err(|source| UidApiError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        Ok(Endpoint {
            url,
            api_key: api_key.into(),
            url_encode_key,
        })
    }

    pub fn from_config(config: &ApiEndpointConfig) -> Result<Self, UidApiError> {
        Self::new(&config.url, config.api_key.clone(), config.url_encode_key)
    }

    /// Base URL, without credentials
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URL for a User-ID call carrying the API key
    pub fn request_url(&self) -> Url {
        // Some keys only survive the firewall's decoding when encoded twice
        let key: Cow<'_, str> = if self.url_encode_key {
            Cow::Owned(url::form_urlencoded::byte_serialize(self.api_key.as_bytes()).collect())
        } else {
            Cow::Borrowed(&self.api_key)
        };

        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("key", &key)
            .append_pair("type", "user-id");
        url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Ordered endpoints with a shared cursor on the active one
#[derive(Debug)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
    cursor: Mutex<usize>,
}

impl EndpointSet {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        EndpointSet {
            endpoints,
            cursor: Mutex::new(0),
        }
    }

    pub fn from_config(config: &UidApiConfig) -> Result<Self, UidApiError> {
        let endpoints = config
            .endpoints
            .iter()
            .map(Endpoint::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(endpoints))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn active_index(&self) -> usize {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Currently active endpoint, or `None` when none are configured
    pub fn active(&self) -> Option<(usize, &Endpoint)> {
        let index = self.active_index();
        self.endpoints.get(index).map(|endpoint| (index, endpoint))
    }

    /// Move past the endpoint at `from`, wrapping around.
    ///
    /// The cursor is only advanced if it still points at `from`, so a
    /// concurrent failover is not repeated. Returns the new active index.
    pub fn fail_over(&self, from: usize) -> usize {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        if *cursor == from && !self.endpoints.is_empty() {
            *cursor = (from + 1) % self.endpoints.len();
        }
        *cursor
    }
}

/// Client for the firewall User-ID XML API
#[derive(Clone)]
pub struct UidApiClient {
    http: reqwest::Client,
    endpoints: Arc<EndpointSet>,
    verbose: bool,
}

impl UidApiClient {
    pub fn new(
        endpoints: EndpointSet,
        timeout: Duration,
        accept_invalid_certs: bool,
        verbose: bool,
    ) -> Result<Self, UidApiError> {
        if accept_invalid_certs {
            warn!("Certificate validation is disabled for User-ID API endpoints");
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(UidApiError::Client)?;

        Ok(UidApiClient {
            http,
            endpoints: Arc::new(endpoints),
            verbose,
        })
    }

    /// `verbose` reports mapping failures that are normally suppressed
    pub fn from_config(config: &UidApiConfig, verbose: bool) -> Result<Self, UidApiError> {
        Self::new(
            EndpointSet::from_config(config)?,
            config.request_timeout(),
            config.disable_certificate_validation,
            verbose,
        )
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    /// Submit a batch, failing over on transport errors.
    ///
    /// Each endpoint is tried at most once per call; the last transport
    /// error is returned once all have failed.
    pub async fn submit(&self, message: &BatchMessage) -> Result<(), UidApiError> {
        let xml = render_uid_message(message);
        let mut attempts = 0;

        loop {
            let (index, endpoint) = self.endpoints.active().ok_or(UidApiError::NoEndpoints)?;
            debug!(endpoint = %endpoint, entries = message.len(), "Submitting User-ID update");

            let source = match self.post(endpoint, &xml).await {
                Ok(body) => return parse_response(&body, self.verbose),
                Err(source) => source,
            };

            attempts += 1;
            let err = UidApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            };
            if attempts >= self.endpoints.len() {
                return Err(err);
            }

            let next = self.endpoints.fail_over(index);
            warn!(
                error = %err,
                next_endpoint = next,
                "User-ID API call failed, failing over"
            );
        }
    }

    async fn post(&self, endpoint: &Endpoint, xml: &str) -> Result<String, reqwest::Error> {
        let file = Part::text(xml.to_owned())
            .file_name("content.xml")
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", file);

        self.http
            .post(endpoint.request_url())
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}
