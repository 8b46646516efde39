pub mod model;

pub use model::{
    FunctionCall, FunctionCallError, FunctionCallingConfig, FunctionCallingMode,
    FunctionDeclaration, FunctionParameters, FunctionResponse, PropertyDetails, Tool, ToolConfig,
};
