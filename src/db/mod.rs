mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::Error::FromSqlConversionFailure;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::models::*;
use crate::update::{apply_llm_update, apply_project_update, LlmRecords, ProjectRecords};

const PROJECT_COLUMNS: &str = "id, name, project_type, embeddings, vectorstore, llm, system, censorship,
     k, score, connection, tables, llm_rerank, colbert_rerank, cache, cache_threshold,
     guard, human_name, human_description, tools, public, default_prompt, created_at, updated_at";

const LLM_COLUMNS: &str =
    "id, name, class_name, options, privacy, description, llm_type, created_at";

/// SQLite-backed store for project and LLM configuration records.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "ragkeep")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("ragkeep.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // Entrances cascade with their project.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_all_projects(&self) -> Result<Vec<ProjectConfig>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM projects ORDER BY name",
            PROJECT_COLUMNS
        ))?;

        let mut projects = stmt
            .query_map([], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        for project in &mut projects {
            project.entrances = read_entrances(&conn, project.id)?;
        }

        Ok(projects)
    }

    pub fn get_project_by_name(&self, name: &str) -> Result<Option<ProjectConfig>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        read_project(&conn, name)
    }

    pub fn create_project(&self, input: CreateProjectInput) -> Result<ProjectConfig> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO projects (id, name, project_type, embeddings, vectorstore, llm, human_name, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.name,
                &input.project_type,
                &input.embeddings,
                &input.vectorstore,
                &input.llm,
                &input.human_name,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        tracing::info!("Created project {}", input.name);

        Ok(ProjectConfig {
            id,
            name: input.name,
            project_type: input.project_type,
            embeddings: input.embeddings,
            vectorstore: input.vectorstore,
            llm: input.llm,
            system: None,
            censorship: None,
            k: 4,
            score: 0.0,
            connection: None,
            tables: None,
            llm_rerank: false,
            colbert_rerank: false,
            cache: false,
            cache_threshold: 0.85,
            guard: None,
            human_name: input.human_name,
            human_description: None,
            tools: None,
            public: false,
            default_prompt: None,
            entrances: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a partial update to the named project.
    ///
    /// Returns `false` only when no project has that name.
    pub fn edit_project(&self, name: &str, update: &ProjectUpdate) -> Result<bool> {
        Ok(apply_project_update(self, name, update)?.is_success())
    }

    pub fn delete_project(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM projects WHERE name = ?", [name])?;
        Ok(rows > 0)
    }

    // ============================================================
    // LLM operations
    // ============================================================

    pub fn get_all_llms(&self) -> Result<Vec<LlmProfile>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!("SELECT {} FROM llms ORDER BY name", LLM_COLUMNS))?;

        let llms = stmt
            .query_map([], llm_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(llms)
    }

    pub fn get_llm_by_name(&self, name: &str) -> Result<Option<LlmProfile>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let llm = conn
            .query_row(
                &format!("SELECT {} FROM llms WHERE name = ?", LLM_COLUMNS),
                [name],
                llm_from_row,
            )
            .optional()?;
        Ok(llm)
    }

    pub fn create_llm(&self, input: CreateLlmInput) -> Result<LlmProfile> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO llms (id, name, class_name, options, privacy, description, llm_type, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.name,
                &input.class_name,
                serde_json::to_string(&input.options)?,
                input.privacy.as_str(),
                &input.description,
                &input.llm_type,
                now.to_rfc3339(),
            ),
        )?;

        Ok(LlmProfile {
            id,
            name: input.name,
            class_name: input.class_name,
            options: input.options,
            privacy: input.privacy,
            description: input.description,
            llm_type: input.llm_type,
            created_at: now,
        })
    }

    /// Apply a partial update to the named LLM profile.
    ///
    /// Returns `false` only when no profile has that name.
    pub fn edit_llm(&self, name: &str, update: &LlmUpdate) -> Result<bool> {
        Ok(apply_llm_update(self, name, update)?.is_success())
    }

    pub fn delete_llm(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM llms WHERE name = ?", [name])?;
        Ok(rows > 0)
    }
}

impl ProjectRecords for Database {
    fn load_project(&self, name: &str) -> Result<Option<ProjectConfig>> {
        self.get_project_by_name(name)
    }

    fn commit_project(&self, project: &ProjectConfig, replace_entrances: bool) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let now = Utc::now();

        let rows = tx.execute(
            "UPDATE projects SET llm = ?, system = ?, censorship = ?, k = ?, score = ?,
                 connection = ?, tables = ?, llm_rerank = ?, colbert_rerank = ?, cache = ?,
                 cache_threshold = ?, guard = ?, human_name = ?, human_description = ?,
                 tools = ?, public = ?, default_prompt = ?, updated_at = ?
             WHERE id = ?",
            params![
                &project.llm,
                &project.system,
                &project.censorship,
                project.k,
                project.score,
                &project.connection,
                &project.tables,
                project.llm_rerank,
                project.colbert_rerank,
                project.cache,
                project.cache_threshold,
                &project.guard,
                &project.human_name,
                &project.human_description,
                &project.tools,
                project.public,
                &project.default_prompt,
                now.to_rfc3339(),
                project.id.to_string(),
            ],
        )?;
        if rows != 1 {
            anyhow::bail!("Project {} no longer exists", project.name);
        }

        if replace_entrances {
            tx.execute(
                "DELETE FROM router_entrances WHERE project_id = ?",
                [project.id.to_string()],
            )?;

            for (position, entrance) in project.entrances.iter().enumerate() {
                tx.execute(
                    "INSERT INTO router_entrances (id, project_id, position, name, description, destination)
                     VALUES (?, ?, ?, ?, ?, ?)",
                    (
                        entrance.id.to_string(),
                        project.id.to_string(),
                        position as i64,
                        &entrance.name,
                        &entrance.description,
                        &entrance.destination,
                    ),
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

impl LlmRecords for Database {
    fn load_llm(&self, name: &str) -> Result<Option<LlmProfile>> {
        self.get_llm_by_name(name)
    }

    fn commit_llm(&self, llm: &LlmProfile) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE llms SET class_name = ?, options = ?, privacy = ?, description = ?, llm_type = ?
             WHERE id = ?",
            (
                &llm.class_name,
                serde_json::to_string(&llm.options)?,
                llm.privacy.as_str(),
                &llm.description,
                &llm.llm_type,
                llm.id.to_string(),
            ),
        )?;
        if rows != 1 {
            anyhow::bail!("LLM {} no longer exists", llm.name);
        }
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn read_project(conn: &Connection, name: &str) -> Result<Option<ProjectConfig>> {
    let project = conn
        .query_row(
            &format!("SELECT {} FROM projects WHERE name = ?", PROJECT_COLUMNS),
            [name],
            project_from_row,
        )
        .optional()?;

    match project {
        Some(mut project) => {
            project.entrances = read_entrances(conn, project.id)?;
            Ok(Some(project))
        }
        None => Ok(None),
    }
}

fn read_entrances(conn: &Connection, project_id: Uuid) -> Result<Vec<RoutingEntrance>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, name, description, destination
         FROM router_entrances WHERE project_id = ? ORDER BY position",
    )?;

    let entrances = stmt
        .query_map([project_id.to_string()], |row| {
            Ok(RoutingEntrance {
                id: parse_uuid(row.get::<_, String>(0)?),
                project_id: parse_uuid(row.get::<_, String>(1)?),
                name: row.get(2)?,
                description: row.get(3)?,
                destination: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entrances)
}

/// Map a `PROJECT_COLUMNS` row. Entrances are loaded separately.
fn project_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectConfig> {
    Ok(ProjectConfig {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        project_type: row.get(2)?,
        embeddings: row.get(3)?,
        vectorstore: row.get(4)?,
        llm: row.get(5)?,
        system: row.get(6)?,
        censorship: row.get(7)?,
        k: row.get(8)?,
        score: row.get(9)?,
        connection: row.get(10)?,
        tables: row.get(11)?,
        llm_rerank: row.get(12)?,
        colbert_rerank: row.get(13)?,
        cache: row.get(14)?,
        cache_threshold: row.get(15)?,
        guard: row.get(16)?,
        human_name: row.get(17)?,
        human_description: row.get(18)?,
        tools: row.get(19)?,
        public: row.get(20)?,
        default_prompt: row.get(21)?,
        entrances: Vec::new(),
        created_at: parse_datetime(row.get::<_, String>(22)?),
        updated_at: parse_datetime(row.get::<_, String>(23)?),
    })
}

/// Bad `options` JSON or an unknown `privacy` fails the read, so a later
/// commit can never write substitutes over the stored values.
fn llm_from_row(row: &Row<'_>) -> rusqlite::Result<LlmProfile> {
    let options_json: String = row.get(3)?;
    let options = serde_json::from_str(&options_json)
        .map_err(|e| FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let privacy: String = row.get(4)?;
    let privacy = LlmPrivacy::from_str(&privacy).ok_or_else(|| {
        FromSqlConversionFailure(4, Type::Text, format!("unknown privacy '{}'", privacy).into())
    })?;

    Ok(LlmProfile {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        class_name: row.get(2)?,
        options,
        privacy,
        description: row.get(5)?,
        llm_type: row.get(6)?,
        created_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
