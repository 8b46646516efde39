use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use snafu::{ResultExt, Snafu};
use std::{fmt, sync::Arc, time::Duration};
use tracing::{instrument, Span};
use url::Url;

use crate::{
    config::{Config, ModelBackend},
    generation::{GenerateContentRequest, GenerationResponse},
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to construct URL (probably incorrect base URL '{base}')"))]
    ConstructUrl {
        source: url::ParseError,
        base: String,
    },

    #[snafu(display("base URL '{base}' cannot carry a path"))]
    BaseUrlNotABase { base: String },

    #[snafu(display("failed to build HTTP client"))]
    BuildClient { source: reqwest::Error },

    #[snafu(display("failed to perform request to '{url}'"))]
    PerformRequest { source: reqwest::Error, url: Url },

    #[snafu(display(
        "bad response from server; code {code}; description: {}",
        description.as_deref().unwrap_or("none")
    ))]
    BadResponse {
        /// HTTP status code
        code: u16,
        /// HTTP error description
        description: Option<String>,
    },

    #[snafu(display("failed to deserialize JSON response"))]
    Deserialize { source: reqwest::Error },
}

impl Error {
    /// HTTP status returned by the server, if the request got that far
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::BadResponse { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Anything that can answer a `generateContent` request.
///
/// The pipeline only talks to the model through this trait, so tests can
/// substitute a canned implementation.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerationResponse, Error>;
}

/// Where `generateContent` lives and how to authenticate against it
#[derive(Clone)]
enum Endpoint {
    GeminiApi { url: Url, api_key: String },
    VertexAi { url: Url, access_token: String },
}

impl Endpoint {
    fn gemini_api(base: &str, model: &str, api_key: String) -> Result<Self, Error> {
        let base = parse_base(base)?;
        let url = join(&base, &format!("{}:generateContent", qualified_model(model)))?;
        Ok(Endpoint::GeminiApi { url, api_key })
    }

    fn vertex_ai(
        base: Option<&str>,
        project_id: &str,
        location: &str,
        model: &str,
        access_token: String,
    ) -> Result<Self, Error> {
        let base = match base {
            Some(base) => parse_base(base)?,
            None => parse_base(&format!("https://{location}-aiplatform.googleapis.com/v1/"))?,
        };
        let path = format!(
            "projects/{project_id}/locations/{location}/publishers/google/models/{}:generateContent",
            bare_model(model)
        );
        Ok(Endpoint::VertexAi {
            url: join(&base, &path)?,
            access_token,
        })
    }

    fn url(&self) -> &Url {
        match self {
            Endpoint::GeminiApi { url, .. } | Endpoint::VertexAi { url, .. } => url,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Endpoint::GeminiApi { api_key, .. } => request.header(API_KEY_HEADER, api_key),
            Endpoint::VertexAi { access_token, .. } => request.bearer_auth(access_token),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Endpoint::GeminiApi { .. } => "GeminiApi",
            Endpoint::VertexAi { .. } => "VertexAi",
        };
        f.debug_struct(kind).field("url", self.url()).finish()
    }
}

/// Internal client for making requests to the Gemini API
#[derive(Debug)]
pub(crate) struct GeminiClient {
    http_client: Client,
    endpoint: Endpoint,
}

impl GeminiClient {
    fn new(endpoint: Endpoint, timeout: Option<Duration>) -> Result<Self, Error> {
        Ok(Self {
            http_client: http_client(timeout)?,
            endpoint,
        })
    }

    /// Generate content
    #[instrument(skip_all, fields(
        model.url = %self.endpoint.url(),
        contents.count = request.contents.len(),
        status.code,
    ))]
    pub(crate) async fn generate_content_raw(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerationResponse, Error> {
        let url = self.endpoint.url().clone();
        let builder = self.http_client.post(url.clone()).json(&request);
        let response = self
            .endpoint
            .authorize(builder)
            .send()
            .await
            .context(PerformRequestSnafu { url })?;

        let response = check_response(response).await?;
        response.json().await.context(DeserializeSnafu)
    }
}

/// Build the shared `reqwest` client, honoring an optional request timeout
pub(crate) fn http_client(timeout: Option<Duration>) -> Result<Client, Error> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().context(BuildClientSnafu)
}

/// Turn non-2xx responses into [`Error::BadResponse`], recording the status on the current span
pub(crate) async fn check_response(response: Response) -> Result<Response, Error> {
    let status = response.status();
    Span::current().record("status.code", status.as_u16());
    if !status.is_success() {
        let description = response.text().await.ok().filter(|text| !text.is_empty());
        return BadResponseSnafu {
            code: status.as_u16(),
            description,
        }
        .fail();
    }
    Ok(response)
}

/// Parse a base URL, making sure it ends with a slash so joins append rather than replace
pub(crate) fn parse_base(base: &str) -> Result<Url, Error> {
    let normalized = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    let url = Url::parse(&normalized).context(ConstructUrlSnafu { base })?;
    if url.cannot_be_a_base() {
        return BaseUrlNotABaseSnafu { base }.fail();
    }
    Ok(url)
}

fn join(base: &Url, path: &str) -> Result<Url, Error> {
    base.join(path).context(ConstructUrlSnafu {
        base: base.to_string(),
    })
}

/// `models/gemini-1.0-pro` for the Gemini API
fn qualified_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

/// `gemini-1.0-pro` for Vertex AI publisher paths
fn bare_model(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

/// Client for the Gemini API
#[derive(Clone, Debug)]
pub struct Gemini {
    client: Arc<GeminiClient>,
}

impl Gemini {
    /// Create a new Gemini API client with the specified API key, model, and base URL
    pub fn with_model_and_base_url(
        api_key: impl Into<String>,
        model: impl AsRef<str>,
        base_url: impl AsRef<str>,
    ) -> Result<Self, Error> {
        let endpoint = Endpoint::gemini_api(base_url.as_ref(), model.as_ref(), api_key.into())?;
        Self::from_endpoint(endpoint, None)
    }

    /// Create a client for a model published on Vertex AI.
    ///
    /// `base_url` defaults to the regional endpoint `https://{location}-aiplatform.googleapis.com/v1/`.
    pub fn vertex(
        project_id: &str,
        location: &str,
        access_token: impl Into<String>,
        model: impl AsRef<str>,
        base_url: Option<&str>,
    ) -> Result<Self, Error> {
        let endpoint = Endpoint::vertex_ai(
            base_url,
            project_id,
            location,
            model.as_ref(),
            access_token.into(),
        )?;
        Self::from_endpoint(endpoint, None)
    }

    /// Create a client from the handler configuration
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let base_override = config.gemini_base_url.as_deref();
        let endpoint = match &config.backend {
            ModelBackend::GeminiApi { api_key } => Endpoint::gemini_api(
                base_override.unwrap_or(DEFAULT_BASE_URL),
                &config.model,
                api_key.clone(),
            )?,
            ModelBackend::VertexAi {
                project_id,
                location,
                access_token,
            } => Endpoint::vertex_ai(
                base_override,
                project_id,
                location,
                &config.model,
                access_token.clone(),
            )?,
        };
        Self::from_endpoint(endpoint, config.timeout)
    }

    fn from_endpoint(endpoint: Endpoint, timeout: Option<Duration>) -> Result<Self, Error> {
        let client = GeminiClient::new(endpoint, timeout)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// The fully resolved `generateContent` URL
    pub fn endpoint_url(&self) -> &Url {
        self.client.endpoint.url()
    }
}

#[async_trait]
impl GenerativeModel for Gemini {
    async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerationResponse, Error> {
        self.client.generate_content_raw(request).await
    }
}
