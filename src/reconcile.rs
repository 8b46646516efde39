//! Second pass: hand the geocoding result back to the model and get a
//! standardized address out of it.

use snafu::{ResultExt, Snafu};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::{
    client::{self, GenerativeModel},
    generation::{ContentBuilder, FinishReason},
    geocoding::GeocodeResult,
    safety::SafetySetting,
    tools::FunctionResponse,
};

/// Field of the synthetic function response that carries the address string
pub const ADDRESS_FIELD: &str = "address";

/// Instruction prepended to the address string on the second pass
pub const STANDARDIZE_PROMPT: &str = "You are an AI address standardizer for assisting with standardizing addresses accurately. Your job is to give the accurate address in the standard format as a JSON object containing the fields DOOR_NUMBER, STREET_ADDRESS, AREA, CITY, TOWN, COUNTY, STATE, COUNTRY, ZIPCODE, LANDMARK by leveraging the address string that follows in the end. Remember the response cannot be empty or null. ";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("standardization request failed"))]
    Model { source: client::Error },

    #[snafu(display(
        "model returned an empty standardized address for '{function_name}' (block reason: {}, finish reason: {})",
        block_reason.as_deref().unwrap_or("none"),
        finish_reason.map_or_else(|| "none".to_string(), |reason| format!("{reason:?}"))
    ))]
    EmptyReply {
        function_name: String,
        block_reason: Option<String>,
        finish_reason: Option<FinishReason>,
    },
}

/// The geocoding result packaged as the response to the model's function call
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationRequest {
    function_response: FunctionResponse,
}

impl ReconciliationRequest {
    pub fn new(function_name: impl Into<String>, result: &GeocodeResult) -> Self {
        Self {
            function_response: FunctionResponse::single_field(
                function_name,
                ADDRESS_FIELD,
                result.address_string(),
            ),
        }
    }

    pub fn function_response(&self) -> &FunctionResponse {
        &self.function_response
    }

    /// The address string, read back from the function response
    pub fn address(&self) -> &str {
        self.function_response
            .string_field(ADDRESS_FIELD)
            .unwrap_or_default()
    }

    /// Prompt for the standardization pass
    pub fn prompt(&self) -> String {
        format!("{STANDARDIZE_PROMPT}: {}", self.address())
    }
}

/// Runs the standardization pass against a model
#[derive(Clone)]
pub struct Reconciler {
    model: Arc<dyn GenerativeModel>,
    safety_settings: Vec<SafetySetting>,
    temperature: Option<f32>,
}

impl Reconciler {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            model,
            safety_settings: SafetySetting::block_only_high(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Send the standardization prompt and return the model's non-empty reply
    #[instrument(skip_all, fields(function.name = %request.function_response().name))]
    pub async fn reconcile(&self, request: ReconciliationRequest) -> Result<String, Error> {
        let mut builder = ContentBuilder::new(self.model.clone())
            .with_user_message(request.prompt())
            .with_safety_settings(self.safety_settings.clone());
        if let Some(temperature) = self.temperature {
            builder = builder.with_temperature(temperature);
        }

        let response = builder.execute().await.context(ModelSnafu)?;
        let text = response.text();
        if text.trim().is_empty() {
            return EmptyReplySnafu {
                function_name: request.function_response().name.clone(),
                block_reason: response.block_reason().map(str::to_string),
                finish_reason: response.finish_reason(),
            }
            .fail();
        }

        debug!(reply.len = text.len(), "standardized address received");
        Ok(text)
    }
}
