use snafu::Snafu;

use crate::{client, extract, geocoding, handler::Stage, reconcile};

/// Coarse classification of a handler failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed inbound envelope or unparseable function call
    Parse,
    /// The model did not request the expected function
    NoFunctionCall,
    /// The model or geocoding API was unreachable or answered non-2xx
    Network,
    /// The model's final answer was empty
    EmptyResult,
    /// The handler could not be constructed from its configuration
    Config,
}

/// Errors produced while serving an address request.
///
/// Pipeline variants record the last [`Stage`] completed before the failure.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("request body is not a valid envelope"))]
    EnvelopeJson {
        source: serde_json::Error,
        stage: Stage,
    },

    #[snafu(display("malformed request envelope: {reason}"))]
    Envelope { reason: String, stage: Stage },

    #[snafu(display("failed to read the model's function call"))]
    FunctionCall {
        source: extract::Error,
        stage: Stage,
    },

    #[snafu(display("model call failed"))]
    Model {
        source: client::Error,
        stage: Stage,
    },

    #[snafu(display("geocoding call failed"))]
    Geocoding {
        source: geocoding::Error,
        stage: Stage,
    },

    #[snafu(display("address standardization failed"))]
    Reconcile {
        source: reconcile::Error,
        stage: Stage,
    },

    #[snafu(display("failed to set up the model client"))]
    ModelSetup { source: client::Error },

    #[snafu(display("failed to set up the geocoding client"))]
    GeocodingSetup { source: geocoding::Error },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EnvelopeJson { .. } | Error::Envelope { .. } => ErrorKind::Parse,
            Error::FunctionCall { source, .. } if source.is_declined() => {
                ErrorKind::NoFunctionCall
            }
            Error::FunctionCall { .. } => ErrorKind::Parse,
            Error::Model { .. } | Error::Geocoding { .. } => ErrorKind::Network,
            Error::Reconcile {
                source: reconcile::Error::Model { .. },
                ..
            } => ErrorKind::Network,
            Error::Reconcile { .. } => ErrorKind::EmptyResult,
            Error::ModelSetup { .. } | Error::GeocodingSetup { .. } => ErrorKind::Config,
        }
    }

    /// Last pipeline stage completed before the failure
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::EnvelopeJson { stage, .. }
            | Error::Envelope { stage, .. }
            | Error::FunctionCall { stage, .. }
            | Error::Model { stage, .. }
            | Error::Geocoding { stage, .. }
            | Error::Reconcile { stage, .. } => Some(*stage),
            Error::ModelSetup { .. } | Error::GeocodingSetup { .. } => None,
        }
    }

    /// Status the HTTP layer should answer with
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Network => 502,
            _ => 500,
        }
    }
}
