//! # geocode-standardizer
//!
//! Reverse geocoding with address standardization, driven by Gemini function
//! calling. An [`AddressHandler`] takes `{"calls": [["<lat>,<lng>"]]}`, lets the
//! model choose the geocoding call, runs it, and answers with
//! `{"replies": ["<structured address>"]}`.

mod client;
mod config;
mod error;
mod extract;
mod generation;
mod geocoding;
mod handler;
mod models;
mod reconcile;
mod safety;
mod tools;

pub mod prelude;


pub use client::{Error as ClientError, Gemini, GenerativeModel};
pub use config::{Config, Error as ConfigError, ModelBackend};
pub use error::{Error, ErrorKind};
pub use extract::{Error as ExtractError, GeocodeQuery, ToolCallDirective};
pub use generation::{
    Candidate, ContentBuilder, FinishReason, GenerateContentRequest, GenerationConfig,
    GenerationResponse, PromptFeedback, UsageMetadata,
};
pub use geocoding::{Error as GeocodingError, GeocodeResult, GeocodingClient, ADDRESS_PREFIX};
pub use handler::{
    address_function, address_prompt, AddressHandler, InboundEnvelope, OutboundEnvelope, Stage,
    FUNCTION_NAME, LATLNG_PARAM,
};
pub use models::{Content, Part, Role};
pub use reconcile::{
    Error as ReconcileError, ReconciliationRequest, Reconciler, ADDRESS_FIELD, STANDARDIZE_PROMPT,
};
pub use safety::{HarmBlockThreshold, HarmCategory, SafetyRating, SafetySetting};
pub use tools::{
    FunctionCall, FunctionCallError, FunctionCallingConfig, FunctionCallingMode,
    FunctionDeclaration, FunctionParameters, FunctionResponse, PropertyDetails, Tool, ToolConfig,
};
