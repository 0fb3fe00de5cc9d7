//! Model-list payloads for both dialects

use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// One entry of Ollama's `GET /api/tags`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OllamaModel {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

/// Ollama's `GET /api/tags` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OllamaTags {
    #[serde(default)]
    pub models: Vec<OllamaModel>,
}

/// One entry of an OpenAI `GET /v1/models` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

/// OpenAI `GET /v1/models` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

impl OllamaModel {
    /// `None` when the entry carries neither `name` nor `model`
    pub fn to_model_info(&self) -> Option<ModelInfo> {
        let id = self
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| self.model.as_deref().filter(|model| !model.is_empty()))?;

        let created = self
            .modified_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map_or(0, |ts| ts.timestamp());

        Some(ModelInfo {
            id: id.to_string(),
            object: "model".to_string(),
            created,
            owned_by: "local".to_string(),
        })
    }
}

impl From<OllamaTags> for ModelList {
    fn from(tags: OllamaTags) -> Self {
        ModelList {
            object: "list".to_string(),
            data: tags
                .models
                .iter()
                .filter_map(OllamaModel::to_model_info)
                .collect(),
        }
    }
}
