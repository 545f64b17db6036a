//! Request and response shapes for the AI service

use super::GatewayError;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Instant;

/// Named operations exposed under `/api/ai/`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Chat,
    GenerateRecipe,
    Vision,
    SpeechToText,
    IngredientSuggestions,
    NutritionAnalysis,
    LearningPath,
}

impl Endpoint {
    pub const ALL: [Endpoint; 7] = [
        Endpoint::Chat,
        Endpoint::GenerateRecipe,
        Endpoint::Vision,
        Endpoint::SpeechToText,
        Endpoint::IngredientSuggestions,
        Endpoint::NutritionAnalysis,
        Endpoint::LearningPath,
    ];

    /// Path segment after `/api/ai/`
    pub fn operation(self) -> &'static str {
        match self {
            Endpoint::Chat => "chat",
            Endpoint::GenerateRecipe => "generate-recipe",
            Endpoint::Vision => "vision",
            Endpoint::SpeechToText => "voice/stt",
            Endpoint::IngredientSuggestions => "ingredient-suggestions",
            Endpoint::NutritionAnalysis => "nutrition-analysis",
            Endpoint::LearningPath => "learning-path",
        }
    }

    pub fn from_operation(operation: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.operation() == operation)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation())
    }
}

/// Body of an outbound call
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Upload(Upload),
}

/// One request as seen by the client
#[derive(Debug, Clone)]
pub struct AiRequest {
    pub endpoint: String,
    pub body: RequestBody,
    pub submitted_at: Instant,
}

impl AiRequest {
    pub fn json(endpoint: impl Into<String>, payload: Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            body: RequestBody::Json(payload),
            submitted_at: Instant::now(),
        }
    }

    pub fn upload(endpoint: impl Into<String>, upload: Upload) -> Self {
        Self {
            endpoint: endpoint.into(),
            body: RequestBody::Upload(upload),
            submitted_at: Instant::now(),
        }
    }
}

/// A single file sent as multipart form data.
///
/// Bytes are owned so the form can be rebuilt for every retry attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub field: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn image(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            field: "image".to_string(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn audio(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            field: "audio".to_string(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn to_form(&self) -> Result<Form, GatewayError> {
        let part = Part::bytes(self.bytes.clone())
            .file_name(self.file_name.clone())
            .mime_str(&self.mime_type)
            .map_err(|e| {
                GatewayError::InvalidRequest(format!("bad mime type {}: {e}", self.mime_type))
            })?;
        Ok(Form::new().part(self.field.clone(), part))
    }
}

/// JSON envelope returned by every AI endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl AiResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    /// Assistant text, looked up in `data.message`, `data.response`,
    /// then top-level `response` and `message`.
    pub fn message(&self) -> Option<&str> {
        let from_data = |key: &str| {
            self.data
                .as_ref()
                .and_then(|d| d.get(key))
                .and_then(Value::as_str)
        };
        from_data("message")
            .or_else(|| from_data("response"))
            .or(self.response.as_deref())
            .or(self.message.as_deref())
            .filter(|text| !text.trim().is_empty())
    }

    /// Reply text for a conversational turn.
    ///
    /// `Ok(None)` means the service answered but had nothing to say.
    pub fn reply(&self) -> Result<Option<String>, GatewayError> {
        if !self.success {
            let reason = self
                .error
                .clone()
                .or_else(|| self.message.clone())
                .unwrap_or_else(|| "request was not successful".to_string());
            return Err(GatewayError::Rejected(reason));
        }
        Ok(self.message().map(str::to_string))
    }
}

/// One prior exchange, sent as conversational context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub command: String,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<ChatTurn>,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub is_voice_command: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeRequest {
    pub ingredients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuisine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dietary_restrictions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooking_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}
