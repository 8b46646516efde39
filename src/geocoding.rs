//! Reverse geocoding against the Google Geocoding API.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use snafu::{ResultExt, Snafu};
use tracing::{debug, instrument, warn, Span};
use url::Url;

use crate::{
    client::{self, check_response, http_client},
    config::Config,
    extract::GeocodeQuery,
};

/// Label the address string handed to the model starts with
pub const ADDRESS_PREFIX: &str = "Address String:";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to construct geocoding URL from endpoint '{endpoint}'"))]
    InvalidUrl {
        source: url::ParseError,
        endpoint: String,
    },

    #[snafu(display("geocoding request to '{endpoint}' failed"))]
    PerformRequest {
        source: reqwest::Error,
        endpoint: String,
    },

    #[snafu(display("geocoding service call failed"))]
    Http { source: client::Error },

    #[snafu(display("failed to read geocoding response body"))]
    ReadBody { source: reqwest::Error },
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeEntry>,
    status: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeEntry {
    /// Kept loose so one odd entry does not discard the others
    formatted_address: Option<Value>,
}

/// Formatted addresses returned for one lookup, in the order the service ranked them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeocodeResult {
    addresses: Vec<String>,
}

impl GeocodeResult {
    pub fn new(addresses: Vec<String>) -> Self {
        Self { addresses }
    }

    /// Parse a Geocoding API body.
    ///
    /// A body that is not JSON, or whose `results` is not an array, yields an
    /// empty result rather than an error.
    pub fn from_body(body: &str) -> Self {
        let response = match serde_json::from_str::<GeocodeResponse>(body) {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, "unparseable geocoding response, treating as no results");
                return Self::default();
            }
        };

        if let Some(status) = response
            .status
            .as_deref()
            .filter(|status| !matches!(*status, "OK" | "ZERO_RESULTS"))
        {
            warn!(
                geocode.status = status,
                geocode.error = response.error_message.as_deref().unwrap_or(""),
                "geocoding service reported a problem"
            );
        }

        Self::new(
            response
                .results
                .into_iter()
                .filter_map(|entry| match entry.formatted_address {
                    Some(Value::String(address)) => Some(address),
                    _ => None,
                })
                .collect(),
        )
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// `Address String:` followed by every address and `"; "`
    pub fn address_string(&self) -> String {
        self.addresses
            .iter()
            .fold(ADDRESS_PREFIX.to_string(), |mut acc, address| {
                acc.push_str(address);
                acc.push_str("; ");
                acc
            })
    }
}

/// Client for the geocoding endpoint
#[derive(Debug, Clone)]
pub struct GeocodingClient {
    http_client: Client,
    endpoint: String,
    api_key: String,
}

impl GeocodingClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, Error> {
        Self::with_client(
            http_client(None).context(HttpSnafu)?,
            endpoint,
            api_key,
        )
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::with_client(
            http_client(config.timeout).context(HttpSnafu)?,
            config.geocoding_endpoint.clone(),
            config.geocoding_api_key.clone(),
        )
    }

    fn with_client(
        http_client: Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, Error> {
        let endpoint = endpoint.into();
        Url::parse(&endpoint).context(InvalidUrlSnafu {
            endpoint: endpoint.clone(),
        })?;
        Ok(Self {
            http_client,
            endpoint,
            api_key: api_key.into(),
        })
    }

    /// `<endpoint>?key=<key><params>`.
    ///
    /// `#` in the parameters is percent-encoded so it stays part of the value
    /// instead of starting a fragment.
    pub(crate) fn build_url(&self, query: &GeocodeQuery) -> Result<Url, Error> {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        let url_str = format!(
            "{}{}key={}{}",
            self.endpoint,
            separator,
            self.api_key,
            query.params.replace('#', "%23")
        );
        Url::parse(&url_str).context(InvalidUrlSnafu {
            endpoint: self.endpoint.clone(),
        })
    }

    /// Look up formatted addresses for the parameters the model chose.
    ///
    /// Transport failures and non-2xx statuses are errors; an unusable body is
    /// an empty result.
    #[instrument(skip_all, fields(
        function.name = %query.function_name,
        status.code,
        geocode.results.count,
    ))]
    pub async fn reverse_geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, Error> {
        let url = self.build_url(query)?;
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context(PerformRequestSnafu {
                endpoint: self.endpoint.clone(),
            })?;

        let response = check_response(response).await.context(HttpSnafu)?;
        let body = response
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context(ReadBodySnafu)?;

        let result = GeocodeResult::from_body(&body);
        Span::current().record("geocode.results.count", result.addresses().len());
        debug!(address = %result.address_string(), "geocoding finished");
        Ok(result)
    }
}
