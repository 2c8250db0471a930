//! Natural-language prompts and their structured project context.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Structured context about the target project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContext {
    /// Resource names that already exist (with routes) in the project.
    #[serde(default)]
    pub existing_resources: Vec<String>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, name: impl Into<String>) -> Self {
        self.existing_resources.push(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.existing_resources.is_empty()
    }

    /// Case-insensitive lookup of an existing resource.
    pub fn has_resource(&self, name: &str) -> bool {
        self.existing_resources
            .iter()
            .any(|r| r.eq_ignore_ascii_case(name))
    }
}

/// A user request. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    text: String,
    context: PromptContext,
}

impl Prompt {
    /// Create a prompt; the text must contain something other than whitespace.
    pub fn new(text: impl Into<String>, context: PromptContext) -> CoreResult<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(CoreError::EmptyPrompt);
        }
        Ok(Self {
            text: text.trim().to_string(),
            context,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn context(&self) -> &PromptContext {
        &self.context
    }

    /// The user message sent to a backend: the request plus any project context.
    pub fn render(&self) -> String {
        if self.context.is_empty() {
            return self.text.clone();
        }
        format!(
            "{}\n\nExisting resources in this project: {}",
            self.text,
            self.context.existing_resources.join(", ")
        )
    }
}
