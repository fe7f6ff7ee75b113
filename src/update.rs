//! Partial updates to configuration records.
//!
//! An update is applied in one pass over a table of field rules. Each rule
//! stages its field on an in-memory copy of the record when the update
//! carries a different, acceptable value. The copy is committed once, and
//! only if some rule staged a change.
//!
//! Two rules differ from plain "present and different":
//! - `connection` refuses values carrying the masked-credential marker, so a
//!   redacted string echoed back by a client never replaces the real one.
//!   The refusal is silent and the rest of the update still applies.
//! - `entrances`, when present, always replaces the whole routing list and
//!   always counts as a change, even if the new list matches the old one.

use anyhow::Result;
use uuid::Uuid;

use crate::models::*;

/// Load and commit access to project records.
pub trait ProjectRecords {
    fn load_project(&self, name: &str) -> Result<Option<ProjectConfig>>;

    /// Persist every field of `project` atomically. With `replace_entrances`
    /// the stored routing list is swapped for `project.entrances` in the same
    /// transaction.
    fn commit_project(&self, project: &ProjectConfig, replace_entrances: bool) -> Result<()>;
}

/// Load and commit access to LLM profile records.
pub trait LlmRecords {
    fn load_llm(&self, name: &str) -> Result<Option<LlmProfile>>;

    fn commit_llm(&self, llm: &LlmProfile) -> Result<()>;
}

/// What an update did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No record has that name; nothing was written.
    NotFound,
    /// Every supplied field already matched; nothing was written.
    Unchanged,
    /// The listed fields were written in one commit.
    Committed { fields: Vec<&'static str> },
}

impl UpdateOutcome {
    /// `false` only when the record does not exist.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::NotFound)
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Stages one field of `R` from an update `U`, returning whether it changed.
pub struct FieldRule<R, U> {
    pub name: &'static str,
    pub stage: fn(&mut R, &U) -> bool,
}

fn accept_any<T>(_: &T) -> bool {
    true
}

// Signature fixed by `stage_optional`.
#[allow(clippy::ptr_arg)]
fn accept_unmasked(connection: &String) -> bool {
    !is_masked_connection(connection)
}

fn stage<T: PartialEq + Clone>(
    current: &mut T,
    proposed: Option<&T>,
    accept: fn(&T) -> bool,
) -> bool {
    match proposed {
        Some(value) if value != current && accept(value) => {
            *current = value.clone();
            true
        }
        _ => false,
    }
}

fn stage_optional<T: PartialEq + Clone>(
    current: &mut Option<T>,
    proposed: Option<&T>,
    accept: fn(&T) -> bool,
) -> bool {
    match proposed {
        Some(value) if current.as_ref() != Some(value) && accept(value) => {
            *current = Some(value.clone());
            true
        }
        _ => false,
    }
}

/// Run every rule once and collect the names of the fields that changed.
fn stage_fields<R, U>(record: &mut R, update: &U, rules: &[FieldRule<R, U>]) -> Vec<&'static str> {
    rules
        .iter()
        .filter(|rule| (rule.stage)(&mut *record, update))
        .map(|rule| rule.name)
        .collect()
}

// ============================================================
// Projects
// ============================================================

type ProjectRule = FieldRule<ProjectConfig, ProjectUpdate>;

const PROJECT_FIELDS: &[ProjectRule] = &[
    ProjectRule {
        name: "llm",
        stage: |p, u| stage(&mut p.llm, u.llm.as_ref(), accept_any),
    },
    ProjectRule {
        name: "system",
        stage: |p, u| stage_optional(&mut p.system, u.system.as_ref(), accept_any),
    },
    ProjectRule {
        name: "censorship",
        stage: |p, u| stage_optional(&mut p.censorship, u.censorship.as_ref(), accept_any),
    },
    ProjectRule {
        name: "k",
        stage: |p, u| stage(&mut p.k, u.k.as_ref(), accept_any),
    },
    ProjectRule {
        name: "score",
        stage: |p, u| stage(&mut p.score, u.score.as_ref(), accept_any),
    },
    ProjectRule {
        name: "connection",
        stage: |p, u| stage_optional(&mut p.connection, u.connection.as_ref(), accept_unmasked),
    },
    ProjectRule {
        name: "tables",
        stage: |p, u| stage_optional(&mut p.tables, u.tables.as_ref(), accept_any),
    },
    ProjectRule {
        name: "llm_rerank",
        stage: |p, u| stage(&mut p.llm_rerank, u.llm_rerank.as_ref(), accept_any),
    },
    ProjectRule {
        name: "colbert_rerank",
        stage: |p, u| stage(&mut p.colbert_rerank, u.colbert_rerank.as_ref(), accept_any),
    },
    ProjectRule {
        name: "cache",
        stage: |p, u| stage(&mut p.cache, u.cache.as_ref(), accept_any),
    },
    ProjectRule {
        name: "cache_threshold",
        stage: |p, u| stage(&mut p.cache_threshold, u.cache_threshold.as_ref(), accept_any),
    },
    ProjectRule {
        name: "guard",
        stage: |p, u| stage_optional(&mut p.guard, u.guard.as_ref(), accept_any),
    },
    ProjectRule {
        name: "human_name",
        stage: |p, u| stage_optional(&mut p.human_name, u.human_name.as_ref(), accept_any),
    },
    ProjectRule {
        name: "human_description",
        stage: |p, u| {
            stage_optional(&mut p.human_description, u.human_description.as_ref(), accept_any)
        },
    },
    ProjectRule {
        name: "tools",
        stage: |p, u| stage_optional(&mut p.tools, u.tools.as_ref(), accept_any),
    },
    ProjectRule {
        name: "public",
        stage: |p, u| stage(&mut p.public, u.public.as_ref(), accept_any),
    },
    ProjectRule {
        name: "default_prompt",
        stage: |p, u| stage_optional(&mut p.default_prompt, u.default_prompt.as_ref(), accept_any),
    },
];

/// Apply `update` to the project called `name`.
pub fn apply_project_update<S: ProjectRecords + ?Sized>(
    records: &S,
    name: &str,
    update: &ProjectUpdate,
) -> Result<UpdateOutcome> {
    let Some(mut project) = records.load_project(name)? else {
        tracing::debug!("Project {} not found, update skipped", name);
        return Ok(UpdateOutcome::NotFound);
    };

    let mut fields = stage_fields(&mut project, update, PROJECT_FIELDS);

    let replace_entrances = match &update.entrances {
        Some(entrances) => {
            let project_id = project.id;
            project.entrances = entrances
                .iter()
                .map(|e| RoutingEntrance {
                    id: Uuid::new_v4(),
                    project_id,
                    name: e.name.clone(),
                    description: e.description.clone(),
                    destination: e.destination.clone(),
                })
                .collect();
            fields.push("entrances");
            true
        }
        None => false,
    };

    if fields.is_empty() {
        tracing::debug!("Project {} unchanged", name);
        return Ok(UpdateOutcome::Unchanged);
    }

    records.commit_project(&project, replace_entrances)?;
    tracing::info!("Updated project {}: {}", name, fields.join(", "));
    Ok(UpdateOutcome::Committed { fields })
}

// ============================================================
// LLM profiles
// ============================================================

type LlmRule = FieldRule<LlmProfile, LlmUpdate>;

const LLM_FIELDS: &[LlmRule] = &[
    LlmRule {
        name: "class_name",
        stage: |l, u| stage(&mut l.class_name, u.class_name.as_ref(), accept_any),
    },
    LlmRule {
        name: "options",
        stage: |l, u| stage(&mut l.options, u.options.as_ref(), accept_any),
    },
    LlmRule {
        name: "privacy",
        stage: |l, u| stage(&mut l.privacy, u.privacy.as_ref(), accept_any),
    },
    LlmRule {
        name: "description",
        stage: |l, u| stage_optional(&mut l.description, u.description.as_ref(), accept_any),
    },
    LlmRule {
        name: "llm_type",
        stage: |l, u| stage(&mut l.llm_type, u.llm_type.as_ref(), accept_any),
    },
];

/// Apply `update` to the LLM profile called `name`.
pub fn apply_llm_update<S: LlmRecords + ?Sized>(
    records: &S,
    name: &str,
    update: &LlmUpdate,
) -> Result<UpdateOutcome> {
    let Some(mut llm) = records.load_llm(name)? else {
        tracing::debug!("LLM {} not found, update skipped", name);
        return Ok(UpdateOutcome::NotFound);
    };

    let fields = stage_fields(&mut llm, update, LLM_FIELDS);
    if fields.is_empty() {
        tracing::debug!("LLM {} unchanged", name);
        return Ok(UpdateOutcome::Unchanged);
    }

    records.commit_llm(&llm)?;
    tracing::info!("Updated LLM {}: {}", name, fields.join(", "));
    Ok(UpdateOutcome::Committed { fields })
}
