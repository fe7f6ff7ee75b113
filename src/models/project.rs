use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marker left in a connection string after its credentials are redacted.
pub const MASKED_CREDENTIALS: &str = "://xxxx:xxxx@";

/// The configuration record of one RAG pipeline.
///
/// A project is created once, then mutated only through
/// [`apply_project_update`](crate::update::apply_project_update). Its routing
/// entrances are owned by the record and are deleted with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: Uuid,
    pub name: String,
    /// Pipeline kind, e.g. `rag`, `inference`, `router`, `ragsql`, `vision`.
    pub project_type: String,
    pub embeddings: Option<String>,
    pub vectorstore: Option<String>,
    /// Name of the LLM profile answering for this project.
    pub llm: String,
    /// System prompt.
    pub system: Option<String>,
    /// Canned answer returned when retrieval finds nothing relevant.
    pub censorship: Option<String>,
    /// Retrieval depth.
    pub k: i64,
    /// Minimum similarity score for retrieved chunks.
    pub score: f64,
    /// Database connection string for SQL projects. Carries credentials.
    pub connection: Option<String>,
    /// Comma-separated table selector for SQL projects.
    pub tables: Option<String>,
    pub llm_rerank: bool,
    pub colbert_rerank: bool,
    pub cache: bool,
    pub cache_threshold: f64,
    /// Name of the guard project screening questions.
    pub guard: Option<String>,
    pub human_name: Option<String>,
    pub human_description: Option<String>,
    /// Comma-separated tool names exposed to agent projects.
    pub tools: Option<String>,
    pub public: bool,
    pub default_prompt: Option<String>,
    /// Routing rules, in stored order.
    pub entrances: Vec<RoutingEntrance>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectConfig {
    /// A copy whose connection string has its credentials masked.
    pub fn redacted(&self) -> Self {
        Self {
            connection: self.connection.as_deref().map(mask_connection),
            ..self.clone()
        }
    }
}

/// A routing rule sending questions that match `description` to `destination`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingEntrance {
    pub id: Uuid,
    /// The project this entrance belongs to.
    pub project_id: Uuid,
    pub name: String,
    pub description: String,
    /// Name of the project questions are routed to.
    pub destination: String,
}

/// One entrance as supplied in an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntranceInput {
    pub name: String,
    pub description: String,
    pub destination: String,
}

/// Input for creating a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectInput {
    pub name: String,
    pub project_type: String,
    pub llm: String,
    pub embeddings: Option<String>,
    pub vectorstore: Option<String>,
    pub human_name: Option<String>,
}

/// Partial update to a project. Absent fields are left untouched.
///
/// `entrances`, when present, replaces the whole routing list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectUpdate {
    pub llm: Option<String>,
    pub system: Option<String>,
    pub censorship: Option<String>,
    pub k: Option<i64>,
    pub score: Option<f64>,
    pub connection: Option<String>,
    pub tables: Option<String>,
    pub llm_rerank: Option<bool>,
    pub colbert_rerank: Option<bool>,
    pub cache: Option<bool>,
    pub cache_threshold: Option<f64>,
    pub guard: Option<String>,
    pub human_name: Option<String>,
    pub human_description: Option<String>,
    pub tools: Option<String>,
    pub public: Option<bool>,
    pub default_prompt: Option<String>,
    pub entrances: Option<Vec<EntranceInput>>,
}

/// Whether a connection string is a redacted placeholder rather than a real value.
pub fn is_masked_connection(connection: &str) -> bool {
    connection.contains(MASKED_CREDENTIALS)
}

/// Replace the userinfo part of a connection URL with `xxxx:xxxx`.
///
/// `mysql+pymysql://user:secret@db:3306/shop` becomes
/// `mysql+pymysql://xxxx:xxxx@db:3306/shop`. Strings without credentials are
/// returned unchanged.
pub fn mask_connection(connection: &str) -> String {
    let Some(scheme_end) = connection.find("://") else {
        return connection.to_string();
    };
    let authority_start = scheme_end + 3;
    let authority_end = connection[authority_start..]
        .find('/')
        .map(|i| authority_start + i)
        .unwrap_or(connection.len());

    match connection[authority_start..authority_end].rfind('@') {
        Some(at) => format!(
            "{}{}{}",
            &connection[..scheme_end],
            MASKED_CREDENTIALS,
            &connection[authority_start + at + 1..]
        ),
        None => connection.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_user_and_password() {
        assert_eq!(
            mask_connection("mysql+pymysql://root:hunter2@db:3306/shop"),
            "mysql+pymysql://xxxx:xxxx@db:3306/shop"
        );
    }

    #[test]
    fn masked_value_is_recognized() {
        let masked = mask_connection("postgresql://app:pw@localhost/rag");
        assert!(is_masked_connection(&masked));
        assert!(!is_masked_connection("postgresql://app:pw@localhost/rag"));
    }

    #[test]
    fn leaves_strings_without_credentials_alone() {
        assert_eq!(mask_connection("sqlite:///./data.db"), "sqlite:///./data.db");
        assert_eq!(mask_connection("not a url"), "not a url");
    }

    #[test]
    fn at_sign_in_path_is_not_treated_as_credentials() {
        assert_eq!(
            mask_connection("postgresql://localhost/db@archive"),
            "postgresql://localhost/db@archive"
        );
    }
}
