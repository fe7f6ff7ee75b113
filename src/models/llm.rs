use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named language-model profile that projects refer to by name.
///
/// Only the profile record is managed here; loading the model behind
/// `class_name` is up to the serving layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmProfile {
    pub id: Uuid,
    pub name: String,
    /// Loader class, e.g. `OpenAI` or `Ollama`.
    pub class_name: String,
    /// Constructor options passed to the loader.
    pub options: serde_json::Value,
    pub privacy: LlmPrivacy,
    pub description: Option<String>,
    /// What the model is used for, e.g. `chat`, `qa` or `vision`.
    pub llm_type: String,
    pub created_at: DateTime<Utc>,
}

/// Whether prompts sent to a model leave the deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LlmPrivacy {
    Public,
    Private,
}

impl LlmPrivacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

/// Input for registering an LLM profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLlmInput {
    pub name: String,
    pub class_name: String,
    #[serde(default = "empty_options")]
    pub options: serde_json::Value,
    pub privacy: LlmPrivacy,
    pub description: Option<String>,
    pub llm_type: String,
}

/// Partial update to an LLM profile. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmUpdate {
    pub class_name: Option<String>,
    pub options: Option<serde_json::Value>,
    pub privacy: Option<LlmPrivacy>,
    pub description: Option<String>,
    pub llm_type: Option<String>,
}

fn empty_options() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}
