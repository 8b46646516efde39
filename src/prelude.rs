//! # Prelude for the geocode-standardizer Crate
//!
//! This module re-exports the most commonly used types for convenience.
//!
//! ```rust,ignore
//! use geocode_standardizer::prelude::*;
//! ```

pub use crate::client::{Error as ClientError, Gemini, GenerativeModel};
pub use crate::config::{Config, ModelBackend};
pub use crate::error::{Error, ErrorKind};
pub use crate::generation::{ContentBuilder, GenerateContentRequest, GenerationResponse};
pub use crate::geocoding::{GeocodeResult, GeocodingClient};
pub use crate::handler::{AddressHandler, InboundEnvelope, OutboundEnvelope, Stage};
pub use crate::models::{Content, Part, Role};
pub use crate::safety::{HarmBlockThreshold, HarmCategory, SafetySetting};
pub use crate::tools::{FunctionCall, FunctionDeclaration, FunctionResponse, Tool};
