//! The HTTP-facing address handler.
//!
//! One call to [`AddressHandler::handle`] walks a request through every
//! [`Stage`]: the coordinates are unwrapped from the inbound envelope, the
//! model picks the geocoding function and its arguments, the geocoder is
//! queried, and the model rewrites the result as a structured address.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use std::{fmt, sync::Arc};
use tracing::{debug, info, instrument};

use crate::{
    client::{Gemini, GenerativeModel},
    config::Config,
    error::{
        EnvelopeJsonSnafu, EnvelopeSnafu, Error, FunctionCallSnafu, GeocodingSetupSnafu,
        GeocodingSnafu, ModelSetupSnafu, ModelSnafu,
    },
    extract::ToolCallDirective,
    generation::ContentBuilder,
    geocoding::GeocodingClient,
    reconcile::{self, ReconciliationRequest, Reconciler},
    tools::{FunctionCallingMode, FunctionDeclaration, FunctionParameters, PropertyDetails},
};

/// Name of the function advertised to the model
pub const FUNCTION_NAME: &str = "getAddress";

/// Parameter the model fills with the coordinates
pub const LATLNG_PARAM: &str = "latlng";

/// Progress of a single request through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    FunctionSchemaBuilt,
    ModelCalled1,
    CallDirectiveExtracted,
    ExternalApiCalled,
    ReconciliationSent,
    ModelCalled2,
    Responded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "RECEIVED",
            Stage::FunctionSchemaBuilt => "FUNCTION_SCHEMA_BUILT",
            Stage::ModelCalled1 => "MODEL_CALLED_1",
            Stage::CallDirectiveExtracted => "CALL_DIRECTIVE_EXTRACTED",
            Stage::ExternalApiCalled => "EXTERNAL_API_CALLED",
            Stage::ReconciliationSent => "RECONCILIATION_SENT",
            Stage::ModelCalled2 => "MODEL_CALLED_2",
            Stage::Responded => "RESPONDED",
        };
        f.write_str(name)
    }
}

/// The `getAddress` declaration advertised on the first pass
pub fn address_function() -> FunctionDeclaration {
    FunctionDeclaration::new(
        FUNCTION_NAME,
        "Get the address for the given latitude and longitude value.",
        FunctionParameters::object().with_property(
            LATLNG_PARAM,
            PropertyDetails::string(
                "This must be a string of latitude and longitude coordinates separated by comma",
            ),
            true,
        ),
    )
}

/// Prompt for the first pass
pub fn address_prompt(coordinates: &str) -> String {
    format!("What's the address for the latlong value '{coordinates}'?")
}

/// Inbound body: `{"calls": [["<lat>,<lng>"]]}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboundEnvelope {
    pub calls: Vec<Vec<Value>>,
}

impl InboundEnvelope {
    /// The coordinate string of the first call, with every `"` removed
    pub fn coordinates(&self) -> Result<String, Error> {
        let first = self
            .calls
            .first()
            .and_then(|call| call.first())
            .context(EnvelopeSnafu {
                reason: "no call arguments",
                stage: Stage::Received,
            })?;

        if self.calls.len() > 1 {
            debug!(
                calls.count = self.calls.len(),
                "only the first call of the envelope is served"
            );
        }

        let raw = match first {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return EnvelopeSnafu {
                    reason: format!("coordinates must be a string, got {other}"),
                    stage: Stage::Received,
                }
                .fail()
            }
        };
        Ok(raw.replace('"', ""))
    }
}

/// Outbound body: `{"replies": ["<text>"]}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundEnvelope {
    pub replies: Vec<String>,
}

impl OutboundEnvelope {
    /// Wrap a model reply, dropping newlines and surrounding whitespace
    pub fn single(reply: &str) -> Self {
        Self {
            replies: vec![reply.replace('\n', "").trim().to_string()],
        }
    }
}

/// Serves address requests.
///
/// Holds no per-request state; clone it or share it behind an `Arc` across
/// concurrent requests.
#[derive(Clone)]
pub struct AddressHandler {
    model: Arc<dyn GenerativeModel>,
    geocoder: GeocodingClient,
    reconciler: Reconciler,
    function_calling_mode: FunctionCallingMode,
    temperature: Option<f32>,
}

impl AddressHandler {
    /// Build the handler with a Gemini client and geocoder described by `config`
    pub fn new(config: &Config) -> Result<Self, Error> {
        let model = Gemini::from_config(config).context(ModelSetupSnafu)?;
        let geocoder = GeocodingClient::from_config(config).context(GeocodingSetupSnafu)?;
        Ok(Self::with_model(Arc::new(model), geocoder)
            .with_function_calling_mode(config.function_calling_mode)
            .with_temperature(config.temperature))
    }

    /// Build the handler around any model implementation
    pub fn with_model(model: Arc<dyn GenerativeModel>, geocoder: GeocodingClient) -> Self {
        Self {
            reconciler: Reconciler::new(model.clone()),
            model,
            geocoder,
            function_calling_mode: FunctionCallingMode::Auto,
            temperature: None,
        }
    }

    pub fn with_function_calling_mode(mut self, mode: FunctionCallingMode) -> Self {
        self.function_calling_mode = mode;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self.reconciler = self.reconciler.with_temperature(temperature);
        self
    }

    /// Serve one raw request body, returning the raw response body
    #[instrument(skip_all, fields(request.bytes = body.len()))]
    pub async fn handle(&self, body: &[u8]) -> Result<Vec<u8>, Error> {
        let envelope: InboundEnvelope = serde_json::from_slice(body).context(EnvelopeJsonSnafu {
            stage: Stage::Received,
        })?;
        let reply = self.handle_envelope(&envelope).await?;
        serde_json::to_vec(&reply).context(EnvelopeJsonSnafu {
            stage: Stage::ModelCalled2,
        })
    }

    /// Serve one decoded envelope
    pub async fn handle_envelope(
        &self,
        envelope: &InboundEnvelope,
    ) -> Result<OutboundEnvelope, Error> {
        let coordinates = envelope.coordinates()?;
        let reply = self.standardize(&coordinates).await?;
        let response = OutboundEnvelope::single(&reply);
        debug!(pipeline.stage = %Stage::Responded, "response ready");
        Ok(response)
    }

    /// Run both model passes and the geocoding lookup for one coordinate string
    #[instrument(skip_all, fields(coordinates = %coordinates))]
    pub async fn standardize(&self, coordinates: &str) -> Result<String, Error> {
        debug!(pipeline.stage = %Stage::Received, "request received");

        let declaration = address_function();
        debug!(
            pipeline.stage = %Stage::FunctionSchemaBuilt,
            function.name = %declaration.name,
            "function declared"
        );

        let mut builder = ContentBuilder::new(self.model.clone())
            .with_user_message(address_prompt(coordinates))
            .with_function(declaration.clone())
            .with_function_calling_mode(self.function_calling_mode);
        if let Some(temperature) = self.temperature {
            builder = builder.with_temperature(temperature);
        }
        let response = builder.execute().await.context(ModelSnafu {
            stage: Stage::FunctionSchemaBuilt,
        })?;
        debug!(pipeline.stage = %Stage::ModelCalled1, "function calling pass answered");

        let directive =
            ToolCallDirective::from_response(&response, &declaration).context(FunctionCallSnafu {
                stage: Stage::ModelCalled1,
            })?;
        info!(
            pipeline.stage = %Stage::CallDirectiveExtracted,
            function.name = directive.name(),
            function.args = ?directive.args(),
            "model requested function call"
        );

        let query = directive.into_query();
        let result = self
            .geocoder
            .reverse_geocode(&query)
            .await
            .context(GeocodingSnafu {
                stage: Stage::CallDirectiveExtracted,
            })?;
        debug!(
            pipeline.stage = %Stage::ExternalApiCalled,
            geocode.results.count = result.addresses().len(),
            "geocoding answered"
        );

        let request = ReconciliationRequest::new(query.function_name, &result);
        debug!(
            pipeline.stage = %Stage::ReconciliationSent,
            "sending function response for standardization"
        );
        let reply = self
            .reconciler
            .reconcile(request)
            .await
            .map_err(|source| {
                let stage = match source {
                    reconcile::Error::EmptyReply { .. } => Stage::ModelCalled2,
                    reconcile::Error::Model { .. } => Stage::ReconciliationSent,
                };
                Error::Reconcile { source, stage }
            })?;
        debug!(pipeline.stage = %Stage::ModelCalled2, "standardized address received");

        Ok(reply)
    }
}
