use std::sync::Arc;
use tracing::instrument;

use crate::{
    client::{Error as ClientError, GenerativeModel},
    generation::{GenerateContentRequest, GenerationConfig, GenerationResponse},
    models::{Content, Role},
    safety::SafetySetting,
    tools::{FunctionCallingConfig, FunctionCallingMode, FunctionDeclaration, Tool, ToolConfig},
};

/// Builder for content generation requests
#[derive(Clone)]
pub struct ContentBuilder {
    model: Arc<dyn GenerativeModel>,
    pub contents: Vec<Content>,
    generation_config: Option<GenerationConfig>,
    safety_settings: Option<Vec<SafetySetting>>,
    tools: Option<Vec<Tool>>,
    tool_config: Option<ToolConfig>,
}

impl ContentBuilder {
    /// Creates a new `ContentBuilder` that will be executed against `model`.
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            model,
            contents: Vec::new(),
            generation_config: None,
            safety_settings: None,
            tools: None,
            tool_config: None,
        }
    }

    /// Sets the safety settings for the request.
    pub fn with_safety_settings(mut self, safety_settings: Vec<SafetySetting>) -> Self {
        self.safety_settings = Some(safety_settings);
        self
    }

    /// Adds a user message to the conversation history.
    pub fn with_user_message(mut self, text: impl Into<String>) -> Self {
        self.contents
            .push(Content::text(text).with_role(Role::User));
        self
    }

    /// Sets the temperature for the request.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.generation_config
            .get_or_insert_with(Default::default)
            .temperature = Some(temperature);
        self
    }

    /// Adds a tool to the request.
    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.get_or_insert_with(Vec::new).push(tool);
        self
    }

    /// Adds a function declaration as a tool.
    ///
    /// This is a convenience method for creating a `Tool` from a `FunctionDeclaration`.
    pub fn with_function(self, function: FunctionDeclaration) -> Self {
        self.with_tool(Tool::new(function))
    }

    /// Sets the function calling mode for the request.
    pub fn with_function_calling_mode(mut self, mode: FunctionCallingMode) -> Self {
        self.tool_config
            .get_or_insert_with(Default::default)
            .function_calling_config = Some(FunctionCallingConfig {
            mode,
            allowed_function_names: None,
        });
        self
    }

    /// Builds the `GenerateContentRequest`.
    pub fn build(self) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: self.contents,
            generation_config: self.generation_config,
            safety_settings: self.safety_settings,
            tools: self.tools,
            tool_config: self.tool_config,
        }
    }

    /// Executes the content generation request.
    #[instrument(skip_all, fields(
        messages.parts.count = self.contents.len(),
        tools.present = self.tools.is_some(),
        safety.settings.present = self.safety_settings.is_some(),
    ))]
    pub async fn execute(self) -> Result<GenerationResponse, ClientError> {
        let model = self.model.clone();
        let request = self.build();
        model.generate_content(request).await
    }
}
