//! Handler configuration.
//!
//! A [`Config`] is built once and handed to [`AddressHandler::new`](crate::AddressHandler::new).
//! It can be assembled in code with the `with_*` setters or read from the
//! process environment with [`Config::from_env`].

use snafu::{OptionExt, ResultExt, Snafu};
use std::{fmt, num::ParseIntError, time::Duration};

use crate::tools::FunctionCallingMode;

pub const DEFAULT_MODEL: &str = "gemini-1.0-pro";
pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_GEOCODING_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";

const ENV_GEOCODING_API_KEY: &str = "GEOCODING_API_KEY";
const ENV_GEOCODING_ENDPOINT: &str = "GEOCODING_ENDPOINT";
const ENV_MODEL: &str = "GEMINI_MODEL";
const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
const ENV_GEMINI_BASE_URL: &str = "GEMINI_BASE_URL";
const ENV_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
const ENV_LOCATION: &str = "GOOGLE_CLOUD_LOCATION";
const ENV_ACCESS_TOKEN: &str = "VERTEX_ACCESS_TOKEN";
const ENV_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("environment variable '{name}' is not set"))]
    MissingVariable { name: &'static str },

    #[snafu(display("environment variable '{name}' has invalid value '{value}'"))]
    InvalidNumber {
        source: ParseIntError,
        name: &'static str,
        value: String,
    },
}

/// Which Gemini deployment serves the model, with its credential
#[derive(Clone, PartialEq, Eq)]
pub enum ModelBackend {
    /// Google AI Gemini API, authenticated with an API key
    GeminiApi { api_key: String },
    /// Vertex AI publisher model, authenticated with an OAuth access token
    VertexAi {
        project_id: String,
        location: String,
        access_token: String,
    },
}

impl fmt::Debug for ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelBackend::GeminiApi { .. } => f
                .debug_struct("GeminiApi")
                .field("api_key", &"<redacted>")
                .finish(),
            ModelBackend::VertexAi {
                project_id,
                location,
                ..
            } => f
                .debug_struct("VertexAi")
                .field("project_id", project_id)
                .field("location", location)
                .field("access_token", &"<redacted>")
                .finish(),
        }
    }
}

/// Everything the handler needs to reach the model and the geocoder
#[derive(Clone)]
pub struct Config {
    /// Model name, with or without the `models/` prefix
    pub model: String,
    pub backend: ModelBackend,
    pub geocoding_api_key: String,
    pub geocoding_endpoint: String,
    /// Overrides the backend's default base URL
    pub gemini_base_url: Option<String>,
    /// Per-request timeout applied to both HTTP clients
    pub timeout: Option<Duration>,
    /// Function calling mode for the first pass
    pub function_calling_mode: FunctionCallingMode,
    pub temperature: Option<f32>,
}

impl Config {
    /// Configuration for the Gemini API
    pub fn gemini_api(api_key: impl Into<String>, geocoding_api_key: impl Into<String>) -> Self {
        Self::with_backend(
            ModelBackend::GeminiApi {
                api_key: api_key.into(),
            },
            geocoding_api_key,
        )
    }

    /// Configuration for Vertex AI
    pub fn vertex_ai(
        project_id: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<String>,
        geocoding_api_key: impl Into<String>,
    ) -> Self {
        Self::with_backend(
            ModelBackend::VertexAi {
                project_id: project_id.into(),
                location: location.into(),
                access_token: access_token.into(),
            },
            geocoding_api_key,
        )
    }

    fn with_backend(backend: ModelBackend, geocoding_api_key: impl Into<String>) -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            backend,
            geocoding_api_key: geocoding_api_key.into(),
            geocoding_endpoint: DEFAULT_GEOCODING_ENDPOINT.to_string(),
            gemini_base_url: None,
            timeout: None,
            function_calling_mode: FunctionCallingMode::Auto,
            temperature: None,
        }
    }

    /// Read the configuration from the process environment.
    ///
    /// Vertex AI is selected when `GOOGLE_CLOUD_PROJECT` is set, the Gemini
    /// API otherwise.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let require = |name: &'static str| lookup(name).context(MissingVariableSnafu { name });

        let geocoding_api_key = require(ENV_GEOCODING_API_KEY)?;
        let mut config = match lookup(ENV_PROJECT) {
            Some(project_id) => Self::vertex_ai(
                project_id,
                lookup(ENV_LOCATION).unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
                require(ENV_ACCESS_TOKEN)?,
                geocoding_api_key,
            ),
            None => Self::gemini_api(require(ENV_GEMINI_API_KEY)?, geocoding_api_key),
        };

        if let Some(model) = lookup(ENV_MODEL) {
            config = config.with_model(model);
        }
        if let Some(endpoint) = lookup(ENV_GEOCODING_ENDPOINT) {
            config = config.with_geocoding_endpoint(endpoint);
        }
        if let Some(base_url) = lookup(ENV_GEMINI_BASE_URL) {
            config = config.with_gemini_base_url(base_url);
        }
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            let secs = value.trim().parse::<u64>().context(InvalidNumberSnafu {
                name: ENV_TIMEOUT_SECS,
                value: value.clone(),
            })?;
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_geocoding_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.geocoding_endpoint = endpoint.into();
        self
    }

    pub fn with_gemini_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.gemini_base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_function_calling_mode(mut self, mode: FunctionCallingMode) -> Self {
        self.function_calling_mode = mode;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("model", &self.model)
            .field("backend", &self.backend)
            .field("geocoding_api_key", &"<redacted>")
            .field("geocoding_endpoint", &self.geocoding_endpoint)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("timeout", &self.timeout)
            .field("function_calling_mode", &self.function_calling_mode)
            .field("temperature", &self.temperature)
            .finish()
    }
}
